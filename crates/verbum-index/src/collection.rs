use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ignore::WalkBuilder;
use serde::Serialize;

use crate::error::IndexError;
use crate::types::{DocId, FileKind};

const SUMMARY_TOPIC_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    Document,
}

/// Size and modification time, used to detect documents that need re-extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// `/`-separated path relative to the collection root; empty for the root.
    pub path: String,
    pub kind: NodeKind,
    pub file_kind: Option<FileKind>,
    pub fingerprint: Option<Fingerprint>,
    pub children: Vec<Node>,
}

impl Node {
    fn folder(name: String, path: String) -> Self {
        Self {
            name,
            path,
            kind: NodeKind::Folder,
            file_kind: None,
            fingerprint: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    #[must_use]
    pub fn doc_id(&self) -> Option<DocId> {
        (self.kind == NodeKind::Document).then(|| DocId::new(self.path.clone()))
    }

    /// Whether this node is a document that can be extracted and queried.
    #[must_use]
    pub fn is_queryable(&self) -> bool {
        self.file_kind.is_some_and(FileKind::is_queryable)
    }

    /// File name without extension, with `_` and `-` read as spaces.
    #[must_use]
    pub fn display_name(&self) -> String {
        let stem = match self.kind {
            NodeKind::Folder => self.name.as_str(),
            NodeKind::Document => Path::new(&self.name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&self.name),
        };
        stem.replace(['_', '-'], " ")
    }

    /// Descendant documents in depth-first, name-sorted order.
    #[must_use]
    pub fn documents(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_documents(&mut out);
        out
    }

    fn collect_documents<'a>(&'a self, out: &mut Vec<&'a Node>) {
        for child in &self.children {
            match child.kind {
                NodeKind::Document => out.push(child),
                NodeKind::Folder => child.collect_documents(out),
            }
        }
    }

    /// Textual description of a folder: its name, subfolders and a few queryable documents.
    #[must_use]
    pub fn summary_text(&self) -> String {
        let mut parts = vec![format!("Knowledge domain: {}", self.name)];
        let subfolders: Vec<&str> = self
            .children
            .iter()
            .filter(|c| c.is_folder())
            .map(|c| c.name.as_str())
            .collect();
        if !subfolders.is_empty() {
            parts.push(format!("Subdomains: {}", subfolders.join(", ")));
        }
        let topics: Vec<String> = self
            .documents()
            .into_iter()
            .filter(|d| d.is_queryable())
            .take(SUMMARY_TOPIC_LIMIT)
            .map(Node::display_name)
            .collect();
        if !topics.is_empty() {
            parts.push(format!("Representative topics: {}", topics.join(", ")));
        }
        parts.join(" ")
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name == name)
    }
}

/// Snapshot of the folder/document tree under a root directory.
#[derive(Debug, Clone)]
pub struct Collection {
    root_dir: PathBuf,
    tree: Node,
    generation: u64,
}

impl Collection {
    /// Walk `root_dir`, skipping hidden entries, and build the name-sorted tree.
    ///
    /// Entries that cannot be read are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns `NotADirectory` if `root_dir` is not a directory.
    pub fn scan(root_dir: &Path, generation: u64) -> Result<Self, IndexError> {
        if !root_dir.is_dir() {
            return Err(IndexError::NotADirectory(root_dir.to_path_buf()));
        }
        let root_name = root_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_owned();
        let mut tree = Node::folder(root_name, String::new());

        let walker = WalkBuilder::new(root_dir)
            .hidden(true)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .follow_links(false)
            .sort_by_file_name(std::cmp::Ord::cmp)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root_dir) else {
                continue;
            };
            let components: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let fingerprint = if is_dir {
                None
            } else {
                match entry.metadata() {
                    Ok(meta) => Some(Fingerprint {
                        size: meta.len(),
                        modified: meta.modified().ok(),
                    }),
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), "skipping file: {e}");
                        continue;
                    }
                }
            };
            insert(&mut tree, &components, is_dir, fingerprint, entry.path());
        }

        let collection = Self {
            root_dir: root_dir.to_path_buf(),
            tree,
            generation,
        };
        tracing::info!(
            root = %root_dir.display(),
            generation,
            documents = collection.tree.documents().len(),
            "scanned collection"
        );
        Ok(collection)
    }

    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    #[must_use]
    pub fn tree(&self) -> &Node {
        &self.tree
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Look up a node by relative path. Leading and trailing slashes are ignored and the
    /// empty path names the root.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Node> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Some(&self.tree);
        }
        let mut node = &self.tree;
        for part in trimmed.split('/') {
            node = node.children.iter().find(|c| c.name == part)?;
        }
        Some(node)
    }

    /// Absolute filesystem path of a document.
    #[must_use]
    pub fn absolute(&self, id: &DocId) -> PathBuf {
        id.as_str()
            .split('/')
            .fold(self.root_dir.clone(), |acc, part| acc.join(part))
    }

    #[must_use]
    pub fn documents(&self) -> Vec<&Node> {
        self.tree.documents()
    }
}

fn insert(
    tree: &mut Node,
    components: &[String],
    is_dir: bool,
    fingerprint: Option<Fingerprint>,
    full_path: &Path,
) {
    let Some((last, parents)) = components.split_last() else {
        return;
    };
    let mut node = tree;
    for part in parents {
        let path = join_path(&node.path, part);
        if node.child_mut(part).is_none() {
            node.children.push(Node::folder(part.clone(), path));
        }
        let Some(next) = node.child_mut(part) else {
            return;
        };
        node = next;
    }
    if node.child_mut(last).is_some() {
        return;
    }
    let path = join_path(&node.path, last);
    let child = if is_dir {
        Node::folder(last.clone(), path)
    } else {
        Node {
            name: last.clone(),
            path,
            kind: NodeKind::Document,
            file_kind: Some(FileKind::from_path(full_path)),
            fingerprint,
            children: Vec::new(),
        }
    };
    node.children.push(child);
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("history/ancient")).unwrap();
        std::fs::create_dir_all(root.join("science")).unwrap();
        std::fs::create_dir_all(root.join(".cache")).unwrap();
        std::fs::write(root.join("history/roman_trade-routes.txt"), "Rome").unwrap();
        std::fs::write(root.join("history/ancient/egypt.md"), "Nile").unwrap();
        std::fs::write(root.join("history/map.png"), [0u8; 4]).unwrap();
        std::fs::write(root.join("science/ferns.txt"), "Ferns").unwrap();
        std::fs::write(root.join(".hidden.txt"), "secret").unwrap();
        std::fs::write(root.join(".cache/junk.txt"), "junk").unwrap();
        std::fs::write(root.join("readme.txt"), "top").unwrap();
        dir
    }

    #[test]
    fn scan_builds_sorted_tree_without_hidden_entries() {
        let dir = fixture();
        let collection = Collection::scan(dir.path(), 1).unwrap();
        let names: Vec<&str> = collection
            .tree()
            .children
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["history", "readme.txt", "science"]);

        let history = collection.find("history").unwrap();
        let names: Vec<&str> = history.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ancient", "map.png", "roman_trade-routes.txt"]);
        assert_eq!(collection.generation(), 1);
    }

    #[test]
    fn find_resolves_paths_and_root() {
        let dir = fixture();
        let collection = Collection::scan(dir.path(), 0).unwrap();
        assert!(collection.find("").unwrap().is_folder());
        assert!(collection.find("/").unwrap().is_folder());
        let egypt = collection.find("/history/ancient/egypt.md/").unwrap();
        assert_eq!(egypt.path, "history/ancient/egypt.md");
        assert_eq!(egypt.kind, NodeKind::Document);
        assert!(egypt.fingerprint.is_some());
        assert!(collection.find("history/missing.txt").is_none());
        assert!(collection.find(".cache").is_none());
    }

    #[test]
    fn documents_are_depth_first() {
        let dir = fixture();
        let collection = Collection::scan(dir.path(), 0).unwrap();
        let paths: Vec<&str> = collection
            .documents()
            .into_iter()
            .map(|d| d.path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec![
                "history/ancient/egypt.md",
                "history/map.png",
                "history/roman_trade-routes.txt",
                "readme.txt",
                "science/ferns.txt",
            ]
        );
    }

    #[test]
    fn non_text_files_are_listed_but_not_queryable() {
        let dir = fixture();
        let collection = Collection::scan(dir.path(), 0).unwrap();
        let png = collection.find("history/map.png").unwrap();
        assert_eq!(png.file_kind, Some(FileKind::Other));
        assert!(!png.is_queryable());
    }

    #[test]
    fn folder_summary_lists_subdomains_and_topics() {
        let dir = fixture();
        let collection = Collection::scan(dir.path(), 0).unwrap();
        let summary = collection.find("history").unwrap().summary_text();
        assert_eq!(
            summary,
            "Knowledge domain: history Subdomains: ancient \
             Representative topics: egypt, roman trade routes"
        );
    }

    #[test]
    fn absolute_path_joins_components() {
        let dir = fixture();
        let collection = Collection::scan(dir.path(), 0).unwrap();
        let path = collection.absolute(&DocId::new("history/ancient/egypt.md"));
        assert!(path.exists());
    }

    #[test]
    fn scan_rejects_missing_root() {
        let err = Collection::scan(Path::new("/nonexistent/verbum-root"), 0).unwrap_err();
        assert!(matches!(err, IndexError::NotADirectory(_)));
    }
}
