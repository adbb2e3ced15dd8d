/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    fat12::export.rs

    Serializes a directory tree to JSON for host-side file browsers.
*/

use serde_derive::Serialize;

use crate::{
    error::FloppyResult,
    fat12::dir::{DirectoryEntryNode, NodeKind},
};

/// Wire form of a [DirectoryEntryNode]. `capacity` and `free` only appear on the disk root,
/// `modified` only when the entry carries a timestamp, and `children` on everything that
/// is not a file.
#[derive(Serialize)]
struct NodeView<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capacity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    free: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<NodeView<'a>>>,
}

impl<'a> From<&'a DirectoryEntryNode> for NodeView<'a> {
    fn from(node: &'a DirectoryEntryNode) -> Self {
        NodeView {
            name: &node.name,
            kind: node.kind.into(),
            size: node.size,
            modified: node.modified.as_deref(),
            capacity: node.capacity,
            free: node.free,
            children: match node.kind {
                NodeKind::File => None,
                _ => Some(node.children.iter().map(NodeView::from).collect()),
            },
        }
    }
}

pub fn tree_to_json(root: &DirectoryEntryNode, pretty: bool) -> FloppyResult<String> {
    let view = NodeView::from(root);
    let json = if pretty {
        serde_json::to_string_pretty(&view)?
    }
    else {
        serde_json::to_string(&view)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn file(name: &str, size: u64, modified: Option<&str>) -> DirectoryEntryNode {
        DirectoryEntryNode {
            kind: NodeKind::File,
            name: name.to_string(),
            short_name: name.to_ascii_uppercase(),
            size,
            first_cluster: 2,
            modified: modified.map(str::to_string),
            children: Vec::new(),
            capacity: None,
            free: None,
            location: None,
        }
    }

    #[test]
    fn schema() {
        let mut dir = file("DOCS", 12, None);
        dir.kind = NodeKind::Directory;
        dir.children = vec![file("a.txt", 12, Some("2024-01-02 03:04:06"))];
        let root = DirectoryEntryNode {
            kind: NodeKind::Disk,
            name: "disk.img".into(),
            short_name: String::new(),
            size: 1024,
            first_cluster: 0,
            modified: None,
            children: vec![dir, file("b.bin", 0, None)],
            capacity: Some(1_457_664),
            free: Some(1_456_640),
            location: None,
        };

        let value: Value = serde_json::from_str(&tree_to_json(&root, false).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "disk.img", "type": "disk", "size": 1024,
                "capacity": 1_457_664, "free": 1_456_640,
                "children": [
                    { "name": "DOCS", "type": "dir", "size": 12, "children": [
                        { "name": "a.txt", "type": "file", "size": 12, "modified": "2024-01-02 03:04:06" }
                    ]},
                    { "name": "b.bin", "type": "file", "size": 0 }
                ]
            })
        );
    }

    #[test]
    fn names_are_escaped() {
        let node = file("say \"hi\"\\\n\u{1}.txt", 1, None);
        let json = tree_to_json(&node, false).unwrap();
        assert!(json.contains(r#"say \"hi\"\\\n\u0001.txt"#));
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "say \"hi\"\\\n\u{1}.txt");
    }
}
