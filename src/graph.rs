//! In-memory mirror of the link structure held in the store.
//!
//! The store stays canonical; this mirror answers inlink and attachment-refcount questions
//! without a query and tells the updater which neighbours a write touched. It is advisory: any
//! inconsistency (refcount underflow, unknown node) is logged and clamped, never a panic.
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    Direction,
};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkNode {
    path: String,
    /// A stored document, as opposed to a link target that may not exist yet.
    present: bool,
}

/// What changed for neighbours when one document's links were replaced or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDelta {
    /// Targets that gained this document as an inlink.
    pub linked: BTreeSet<String>,
    /// Targets that lost this document as an inlink.
    pub unlinked: BTreeSet<String>,
    /// Attachments whose refcount went from zero to one.
    pub acquired: BTreeSet<String>,
    /// Attachments whose refcount dropped to zero.
    pub released: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct LinkGraph {
    graph: StableDiGraph<LinkNode, ()>,
    index: HashMap<String, NodeIndex>,
    attachments: HashMap<String, BTreeSet<String>>,
    attachment_refs: HashMap<String, usize>,
}

impl LinkGraph {
    pub fn new() -> Self {
        LinkGraph::default()
    }

    /// Build from stored rows: every document path, `(from, to)` outlinks and `(from, file)`
    /// attachments.
    pub fn from_rows<I>(documents: I, outlinks: &[(String, String)], attachments: &[(String, String)]) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut graph = LinkGraph::new();
        for path in documents {
            let idx = graph.node(&path);
            graph.graph[idx].present = true;
        }
        for (from, to) in outlinks {
            let source = graph.node(from);
            let sink = graph.node(to);
            graph.graph.update_edge(source, sink, ());
        }
        for (from, file) in attachments {
            if graph
                .attachments
                .entry(from.clone())
                .or_default()
                .insert(file.clone())
            {
                *graph.attachment_refs.entry(file.clone()).or_insert(0) += 1;
            }
        }
        graph
    }

    fn node(&mut self, path: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(path) {
            return *idx;
        }
        let idx = self.graph.add_node(LinkNode {
            path: path.to_string(),
            present: false,
        });
        self.index.insert(path.to_string(), idx);
        idx
    }

    /// Drop a node once it is neither a stored document nor the target of any link.
    fn prune(&mut self, idx: NodeIndex) {
        let Some(node) = self.graph.node_weight(idx) else {
            return;
        };
        if node.present
            || self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .next()
                .is_some()
        {
            return;
        }
        let path = node.path.clone();
        self.graph.remove_node(idx);
        self.index.remove(&path);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index
            .get(path)
            .and_then(|idx| self.graph.node_weight(*idx))
            .is_some_and(|node| node.present)
    }

    pub fn document_count(&self) -> usize {
        self.graph.node_weights().filter(|n| n.present).count()
    }

    fn neighbours(&self, path: &str, direction: Direction) -> BTreeSet<String> {
        let Some(idx) = self.index.get(path) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(*idx, direction)
            .filter_map(|n| self.graph.node_weight(n))
            .map(|n| n.path.clone())
            .collect()
    }

    /// Stored documents below the directory `dir` (rooted, e.g. `/notes`).
    pub fn documents_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut paths: Vec<String> = self
            .graph
            .node_weights()
            .filter(|n| n.present && n.path.starts_with(&prefix))
            .map(|n| n.path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn outlinks(&self, path: &str) -> BTreeSet<String> {
        self.neighbours(path, Direction::Outgoing)
    }

    pub fn inlinks(&self, path: &str) -> BTreeSet<String> {
        self.neighbours(path, Direction::Incoming)
    }

    pub fn attachments(&self, path: &str) -> BTreeSet<String> {
        self.attachments.get(path).cloned().unwrap_or_default()
    }

    pub fn attachment_refs(&self, file: &str) -> usize {
        self.attachment_refs.get(file).copied().unwrap_or(0)
    }

    pub fn is_attachment_served(&self, file: &str) -> bool {
        self.attachment_refs(file) > 0
    }

    /// Replace `path`'s outlinks and attachments with the new sets. Refcounts are adjusted by the
    /// difference between the old and new attachment sets.
    pub fn replace(
        &mut self,
        path: &str,
        outlinks: &BTreeSet<String>,
        attachments: &BTreeSet<String>,
    ) -> LinkDelta {
        let mut delta = LinkDelta::default();
        let source = self.node(path);
        self.graph[source].present = true;

        let old_links = self.outlinks(path);
        for gone in old_links.difference(outlinks) {
            if let Some(sink) = self.index.get(gone).copied() {
                if let Some(edge) = self.graph.find_edge(source, sink) {
                    self.graph.remove_edge(edge);
                }
                self.prune(sink);
            }
            delta.unlinked.insert(gone.clone());
        }
        for added in outlinks.difference(&old_links) {
            let sink = self.node(added);
            self.graph.update_edge(source, sink, ());
            delta.linked.insert(added.clone());
        }

        let old_files = self.attachments.remove(path).unwrap_or_default();
        for gone in old_files.difference(attachments) {
            if self.release(gone) {
                delta.released.insert(gone.clone());
            }
        }
        for added in attachments.difference(&old_files) {
            let count = self.attachment_refs.entry(added.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                delta.acquired.insert(added.clone());
            }
        }
        if !attachments.is_empty() {
            self.attachments.insert(path.to_string(), attachments.clone());
        }
        delta
    }

    /// Forget a stored document. Its node survives while other documents still link to it.
    pub fn remove(&mut self, path: &str) -> LinkDelta {
        let Some(source) = self.index.get(path).copied() else {
            let mut delta = LinkDelta::default();
            for file in self.attachments.remove(path).unwrap_or_default() {
                if self.release(&file) {
                    delta.released.insert(file);
                }
            }
            return delta;
        };
        let mut delta = self.replace(path, &BTreeSet::new(), &BTreeSet::new());
        self.graph[source].present = false;
        self.prune(source);
        delta.acquired.clear();
        delta
    }

    /// Decrement a refcount, returning true when it reached zero.
    fn release(&mut self, file: &str) -> bool {
        match self.attachment_refs.get_mut(file) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.attachment_refs.remove(file);
                true
            }
            None => {
                tracing::warn!("[LinkGraph] refcount underflow for {file}, ignoring");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn inlinks_follow_outlinks() {
        let mut graph = LinkGraph::new();
        let delta = graph.replace("/a.md", &set(&["/b.md"]), &set(&[]));
        assert_eq!(delta.linked, set(&["/b.md"]));
        assert_eq!(graph.inlinks("/b.md"), set(&["/a.md"]));
        assert!(!graph.contains("/b.md"));

        graph.replace("/b.md", &set(&[]), &set(&[]));
        assert!(graph.contains("/b.md"));
        assert_eq!(graph.inlinks("/b.md"), set(&["/a.md"]));

        let delta = graph.replace("/a.md", &set(&["/c.md"]), &set(&[]));
        assert_eq!(delta.unlinked, set(&["/b.md"]));
        assert!(graph.inlinks("/b.md").is_empty());
        assert_eq!(graph.document_count(), 2);
        assert_eq!(graph.documents_under("/"), vec!["/a.md", "/b.md"]);
        assert!(graph.documents_under("/a").is_empty());
    }

    #[test]
    fn attachment_refcounts_use_set_difference() {
        let mut graph = LinkGraph::new();
        let delta = graph.replace("/a.md", &set(&[]), &set(&["/img.png"]));
        assert_eq!(delta.acquired, set(&["/img.png"]));
        graph.replace("/b.md", &set(&[]), &set(&["/img.png"]));
        assert_eq!(graph.attachment_refs("/img.png"), 2);

        // Re-replacing with the same set leaves counts alone.
        let delta = graph.replace("/a.md", &set(&[]), &set(&["/img.png"]));
        assert_eq!(delta, LinkDelta::default());
        assert_eq!(graph.attachment_refs("/img.png"), 2);

        let delta = graph.remove("/a.md");
        assert!(delta.released.is_empty());
        assert!(graph.is_attachment_served("/img.png"));

        let delta = graph.remove("/b.md");
        assert_eq!(delta.released, set(&["/img.png"]));
        assert!(!graph.is_attachment_served("/img.png"));
    }

    #[test]
    fn removal_keeps_targets_that_are_still_linked() {
        let mut graph = LinkGraph::from_rows(
            ["/a.md".to_string(), "/b.md".to_string()],
            &[("/a.md".into(), "/b.md".into())],
            &[],
        );
        graph.remove("/b.md");
        assert!(!graph.contains("/b.md"));
        assert_eq!(graph.inlinks("/b.md"), set(&["/a.md"]));
        let delta = graph.remove("/a.md");
        assert_eq!(delta.unlinked, set(&["/b.md"]));
        assert_eq!(graph.document_count(), 0);
        assert!(graph.index.is_empty());
    }

    #[test]
    fn underflow_is_a_no_op() {
        let mut graph = LinkGraph::new();
        assert!(!graph.release("/never.png"));
        assert_eq!(graph.attachment_refs("/never.png"), 0);
    }
}
