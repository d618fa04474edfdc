//! Folder listings and path reconstruction.
//!
//! A folder listing is a flat list of nodes. Each node carries its own key
//! wrapped (AES-ECB) with the folder's shared key, plus an attribute blob
//! encrypted with that node key. [`resolve`] unwraps the keys, decrypts the
//! names and rebuilds relative paths by walking parent pointers.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::attrs::decrypt_attributes;
use crate::crypto::ecb_decrypt;
use crate::keys::KeyMaterial;

/// Node type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum NodeKind {
    /// `t == 0`
    File,
    /// `t == 1`
    Folder,
    /// Any other tag (account roots, trash, inbox).
    Other(u8),
}

impl From<u8> for NodeKind {
    fn from(tag: u8) -> Self {
        match tag {
            0 => Self::File,
            1 => Self::Folder,
            other => Self::Other(other),
        }
    }
}

impl From<NodeKind> for u8 {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => 0,
            NodeKind::Folder => 1,
            NodeKind::Other(tag) => tag,
        }
    }
}

/// One entry of a folder listing, as returned by the metadata API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque node id.
    #[serde(rename = "h")]
    pub id: String,
    /// Parent node id. The shared root's parent is not part of the listing.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// File or folder.
    #[serde(rename = "t")]
    pub kind: NodeKind,
    /// Wrapped node key, `owner:payload` (only the last segment matters).
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Encrypted attribute blob.
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,
    /// File size in bytes.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A downloadable file found in a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Node id, used to request the media URL.
    pub id: String,
    /// Path relative to the download directory.
    pub path: PathBuf,
    /// Unwrapped file key (eight words for regular files).
    pub key: KeyMaterial,
    /// Size from the listing, if present.
    pub size: Option<u64>,
}

/// Resolves every downloadable file in a listing.
///
/// Nodes whose key cannot be unwrapped are left out; the rest of the listing
/// is still processed. With a `target` folder id, only files below that
/// folder are returned and their paths are relative to it. Results keep the
/// listing order.
#[must_use]
pub fn resolve(nodes: &[Node], shared_key: &[u8; 16], target: Option<&str>) -> Vec<ResolvedFile> {
    let ctx = ResolutionContext::build(nodes, shared_key);
    let target = target.filter(|id| {
        let known = ctx.by_id.contains_key(*id);
        if !known {
            log::warn!("target folder {id} is not in the listing; returning every file");
        }
        known
    });
    let allowed = target.map(|id| ctx.descendants(id));

    nodes
        .iter()
        .filter(|node| node.kind == NodeKind::File)
        .filter(|node| {
            allowed
                .as_ref()
                .is_none_or(|set| set.contains(node.id.as_str()))
        })
        .filter_map(|node| {
            let key = ctx.keys.get(node.id.as_str())?.clone();
            Some(ResolvedFile {
                id: node.id.clone(),
                path: ctx.relative_path(node, target),
                key,
                size: node.size,
            })
        })
        .collect()
}

/// Per-call lookup tables. Built once per listing and dropped afterwards.
struct ResolutionContext<'a> {
    nodes: &'a [Node],
    by_id: HashMap<&'a str, &'a Node>,
    keys: HashMap<&'a str, KeyMaterial>,
    names: HashMap<&'a str, String>,
}

impl<'a> ResolutionContext<'a> {
    fn build(nodes: &'a [Node], shared_key: &[u8; 16]) -> Self {
        let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut keys = HashMap::new();
        let mut names = HashMap::new();

        for node in nodes {
            let Some(key) = unwrap_node_key(node, shared_key) else {
                log::debug!("skipping node {}: key does not unwrap", node.id);
                continue;
            };
            if let (Some(blob), Ok(derived)) = (node.attributes.as_deref(), key.derive()) {
                let attrs = decrypt_attributes(blob, &derived.key);
                match attrs.name() {
                    Some(name) if !name.is_empty() => {
                        names.insert(node.id.as_str(), name.to_string());
                    }
                    _ => log::warn!("node {} has no readable name", node.id),
                }
            }
            keys.insert(node.id.as_str(), key);
        }

        Self {
            nodes,
            by_id,
            keys,
            names,
        }
    }

    fn parent_of(&self, node: &Node) -> Option<&'a Node> {
        node.parent
            .as_deref()
            .and_then(|p| self.by_id.get(p))
            .copied()
    }

    /// Safe single path component for a node.
    fn component(&self, node: &Node) -> String {
        let name = self.names.get(node.id.as_str()).map_or(node.id.as_str(), String::as_str);
        sanitize_component(name, &node.id)
    }

    /// Every node id reachable from `root` through parent/child edges,
    /// `root` included.
    fn descendants<'s>(&'s self, root: &'s str) -> HashSet<&'s str> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in self.nodes {
            if let Some(parent) = node.parent.as_deref() {
                children.entry(parent).or_default().push(node.id.as_str());
            }
        }

        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(kids) = children.get(id) {
                stack.extend(kids.iter().copied());
            }
        }
        seen
    }

    /// Relative path of `node`.
    ///
    /// Ascends through folder ancestors, stopping below the shared root (a
    /// node whose parent is not listed) or below `target`. With a target,
    /// any segments before the first one equal to the target's name are then
    /// dropped.
    fn relative_path(&self, node: &'a Node, target: Option<&str>) -> PathBuf {
        let mut parts = vec![self.component(node)];
        let mut visited = HashSet::from([node.id.as_str()]);
        let mut current = node;

        while let Some(parent) = self.parent_of(current) {
            if Some(parent.id.as_str()) == target || self.parent_of(parent).is_none() {
                break;
            }
            if !visited.insert(parent.id.as_str()) {
                log::warn!("parent cycle at node {}", parent.id);
                break;
            }
            if parent.kind == NodeKind::Folder {
                parts.push(self.component(parent));
            }
            current = parent;
        }
        parts.reverse();

        if let Some(target_name) = target.and_then(|id| self.names.get(id)) {
            if let Some(pos) = parts.iter().position(|p| p == target_name) {
                parts.drain(..pos);
            }
        }
        parts.iter().collect()
    }
}

/// Unwraps a node key with the shared folder key.
///
/// Uses the last `:`-separated segment of the key field. A 32-byte result is
/// a file key and is kept whole (its halves XOR to the AES key, the second
/// half also carries the nonce); anything else contributes its first 16
/// bytes.
fn unwrap_node_key(node: &Node, shared_key: &[u8; 16]) -> Option<KeyMaterial> {
    let payload = node.key.as_deref()?.rsplit(':').next()?;
    let wrapped = crate::base64::decode(payload).ok()?;
    let plain = ecb_decrypt(&wrapped, shared_key)?;
    match plain.len() {
        // not folded here: the CTR nonce lives in words 4 and 5
        32 => Some(KeyMaterial::from_bytes(&plain)),
        n if n >= 16 => Some(KeyMaterial::from_bytes(&plain[..16])),
        _ => None,
    }
}

/// Turns an untrusted display name into one path component.
///
/// Separators and NUL are replaced with `_`. Names that would be empty or
/// refer to the current or parent directory fall back to `fallback`.
#[must_use]
pub fn sanitize_component(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => fallback.to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::encrypt_attributes;
    use crate::crypto::ecb_encrypt;
    use serde_json::json;
    use std::path::Path;

    const SHARED: [u8; 16] = [0x5a; 16];

    fn wrap(raw: &[u8]) -> String {
        format!("owner:{}", crate::base64::encode(&ecb_encrypt(raw, &SHARED).unwrap()))
    }

    fn folder(id: &str, parent: Option<&str>, name: &str) -> Node {
        let raw = [id.as_bytes()[0]; 16];
        Node {
            id: id.into(),
            parent: parent.map(Into::into),
            kind: NodeKind::Folder,
            key: Some(wrap(&raw)),
            attributes: Some(encrypt_attributes(&json!({ "n": name }), &raw)),
            size: None,
        }
    }

    fn file(id: &str, parent: &str, name: &str) -> Node {
        let raw: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(7) ^ id.as_bytes()[0]).collect();
        let derived = KeyMaterial::from_bytes(&raw).derive().unwrap();
        Node {
            id: id.into(),
            parent: Some(parent.into()),
            kind: NodeKind::File,
            key: Some(wrap(&raw)),
            attributes: Some(encrypt_attributes(&json!({ "n": name }), &derived.key)),
            size: Some(42),
        }
    }

    /// root -> A -> B -> f.txt, root -> top.txt, A -> a.txt
    fn sample() -> Vec<Node> {
        vec![
            folder("root0000", Some("owner000"), "root"),
            folder("folderA0", Some("root0000"), "A"),
            folder("folderB0", Some("folderA0"), "B"),
            file("fileF000", "folderB0", "f.txt"),
            file("fileT000", "root0000", "top.txt"),
            file("fileA000", "folderA0", "a.txt"),
        ]
    }

    fn paths(files: &[ResolvedFile]) -> Vec<&Path> {
        files.iter().map(|f| f.path.as_path()).collect()
    }

    #[test]
    fn rebuilds_nested_path() {
        let files = resolve(&sample(), &SHARED, None);
        let f = files.iter().find(|f| f.id == "fileF000").unwrap();
        assert_eq!(f.path, Path::new("A/B/f.txt"));
    }

    #[test]
    fn keeps_listing_order() {
        let files = resolve(&sample(), &SHARED, None);
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["fileF000", "fileT000", "fileA000"]);
        assert_eq!(
            paths(&files),
            [Path::new("A/B/f.txt"), Path::new("top.txt"), Path::new("A/a.txt")]
        );
    }

    #[test]
    fn scopes_to_target_folder() {
        let files = resolve(&sample(), &SHARED, Some("folderB0"));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "fileF000");
        assert_eq!(files[0].path, Path::new("f.txt"));
    }

    #[test]
    fn scoping_includes_nested_descendants() {
        let files = resolve(&sample(), &SHARED, Some("folderA0"));
        assert_eq!(paths(&files), [Path::new("B/f.txt"), Path::new("a.txt")]);
    }

    #[test]
    fn unknown_target_returns_everything() {
        let files = resolve(&sample(), &SHARED, Some("missing0"));
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn bad_key_skips_only_that_node() {
        let mut nodes = sample();
        nodes.push(Node {
            key: Some("owner:AAAA".into()),
            ..file("fileBad0", "folderB0", "bad.txt")
        });
        nodes.push(file("fileOk00", "folderB0", "ok.txt"));

        let files = resolve(&nodes, &SHARED, None);
        assert!(files.iter().all(|f| f.id != "fileBad0"));
        let ok = files.iter().find(|f| f.id == "fileOk00").unwrap();
        assert_eq!(ok.path, Path::new("A/B/ok.txt"));
    }

    #[test]
    fn missing_key_skips_node() {
        let mut nodes = sample();
        nodes.push(Node {
            key: None,
            ..file("fileNoK0", "root0000", "x")
        });
        assert!(resolve(&nodes, &SHARED, None).iter().all(|f| f.id != "fileNoK0"));
    }

    #[test]
    fn unreadable_name_falls_back_to_id() {
        let mut nodes = sample();
        nodes.push(Node {
            attributes: Some("garbage".into()),
            ..file("fileAnon", "folderA0", "ignored")
        });
        let files = resolve(&nodes, &SHARED, None);
        let anon = files.iter().find(|f| f.id == "fileAnon").unwrap();
        assert_eq!(anon.path, Path::new("A/fileAnon"));
    }

    #[test]
    fn unreadable_folder_name_falls_back_to_id() {
        let mut nodes = sample();
        nodes[1].attributes = None;
        let files = resolve(&nodes, &SHARED, None);
        assert_eq!(files[0].path, Path::new("folderA0/B/f.txt"));
    }

    #[test]
    fn file_key_keeps_nonce_words() {
        let files = resolve(&sample(), &SHARED, None);
        let f = &files[0];
        assert_eq!(f.key.len(), 8);
        let raw: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(7) ^ b'f').collect();
        assert_eq!(f.key.to_bytes(), raw);
        assert_eq!(f.key.derive().unwrap().iv.as_slice(), &raw[16..24]);
        assert_ne!(f.key.derive().unwrap().iv, [0u8; 8]);
        assert_eq!(f.size, Some(42));
    }

    #[test]
    fn hostile_names_cannot_escape() {
        let nodes = vec![
            folder("root0000", None, "root"),
            folder("folderX0", Some("root0000"), ".."),
            file("fileE000", "folderX0", "../../etc/passwd"),
        ];
        let files = resolve(&nodes, &SHARED, None);
        assert_eq!(files[0].path, Path::new("folderX0/.._.._etc_passwd"));
    }

    #[test]
    fn parent_cycle_terminates() {
        let a = folder("cycleA00", Some("cycleB00"), "a");
        let b = folder("cycleB00", Some("cycleA00"), "b");
        let nodes = vec![a, b, file("fileC000", "cycleA00", "c.txt")];
        let files = resolve(&nodes, &SHARED, None);
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("c.txt"));
    }

    #[test]
    fn name_trim_applies_when_target_name_repeats() {
        // B -> X -> B -> g.txt, target is the outer B
        let nodes = vec![
            folder("root0000", None, "root"),
            folder("outerB00", Some("root0000"), "B"),
            folder("middleX0", Some("outerB00"), "X"),
            folder("innerB00", Some("middleX0"), "B"),
            file("fileG000", "innerB00", "g.txt"),
        ];
        let files = resolve(&nodes, &SHARED, Some("outerB00"));
        assert_eq!(files[0].path, Path::new("B/g.txt"));
    }

    #[test]
    fn node_deserializes_from_listing_json() {
        let node: Node = serde_json::from_value(json!({
            "h": "abcdefgh", "p": "parent00", "t": 0, "k": "o:key", "a": "attr", "s": 5, "ts": 1
        }))
        .unwrap();
        assert_eq!(node.kind, NodeKind::File);
        assert_eq!(node.size, Some(5));

        let root: Node = serde_json::from_value(json!({"h": "r", "t": 2})).unwrap();
        assert_eq!(root.kind, NodeKind::Other(2));
        assert_eq!(root.parent, None);
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_component("a/b\\c", "id"), "a_b_c");
        assert_eq!(sanitize_component(".", "id"), "id");
        assert_eq!(sanitize_component("..", "id"), "id");
        assert_eq!(sanitize_component("  ", "id"), "id");
        assert_eq!(sanitize_component("ok name.txt", "id"), "ok name.txt");
    }
}
