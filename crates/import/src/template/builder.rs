use crate::error::{ErrorKind, Result};
use crate::scanner::ScannerKind;
use crate::template::{MatchNode, Matcher, MetadataFn, NodeRef, Template, TemplateNode};
use exn::OptionExt;
use regex::Regex;
use std::sync::Arc;

/// One level of a template, before it's linked to the level below.
#[derive(Clone)]
pub struct NodeSpec {
    matcher: Matcher,
    packfile_type: Option<String>,
    packfile_name: Option<String>,
    metadata_fn: Option<MetadataFn>,
}

impl NodeSpec {
    fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            packfile_type: None,
            packfile_name: None,
            metadata_fn: None,
        }
    }

    /// Match any directory, capturing nothing.
    pub fn any() -> Self {
        Self::new(Matcher::Any)
    }

    /// Match any directory, storing its name under `key`.
    pub fn metavar(key: impl Into<String>) -> Self {
        Self::new(Matcher::Metavar(key.into()))
    }

    pub fn literal(name: impl Into<String>) -> Self {
        Self::new(Matcher::Literal(name.into()))
    }

    pub fn pattern(regex: Regex) -> Self {
        Self::new(Matcher::Pattern(regex))
    }

    /// Package the matched directory as a packfile of this type.
    pub fn packfile(mut self, packfile_type: impl Into<String>) -> Self {
        self.packfile_type = Some(packfile_type.into());
        self
    }

    pub fn packfile_name(mut self, name: impl Into<String>) -> Self {
        self.packfile_name = Some(name.into());
        self
    }

    pub fn metadata(mut self, metadata_fn: MetadataFn) -> Self {
        self.metadata_fn = Some(metadata_fn);
        self
    }

    fn link(self, next: Option<NodeRef>) -> NodeRef {
        Arc::new(TemplateNode::Match(MatchNode {
            matcher: self.matcher,
            packfile_type: self.packfile_type,
            packfile_name: self.packfile_name,
            metadata_fn: self.metadata_fn,
            next,
        }))
    }
}

enum Step {
    Node(NodeSpec),
    Composite(Vec<NodeSpec>),
    Scanner(ScannerKind),
}

/// Collects template levels in order and links them once, at the end.
///
/// ```
/// use hoist_import::template::{NodeSpec, TemplateBuilder};
///
/// let template = TemplateBuilder::default()
///     .add_node(NodeSpec::metavar("group"))
///     .add_node(NodeSpec::metavar("project"))
///     .add_node(NodeSpec::literal("dicom").packfile("dicom"))
///     .build()
///     .unwrap();
/// # let _ = template;
/// ```
#[derive(Default)]
pub struct TemplateBuilder {
    steps: Vec<Step>,
}

impl TemplateBuilder {
    pub fn add_node(mut self, spec: NodeSpec) -> Self {
        self.steps.push(Step::Node(spec));
        self
    }

    /// A level that may be any one of `specs`, tried in order.
    ///
    /// Every alternative continues with the next level added.
    pub fn add_composite(mut self, specs: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.steps.push(Step::Composite(specs.into_iter().collect()));
        self
    }

    /// Hand everything below the previous level to a scanner.
    pub fn add_scanner(mut self, kind: ScannerKind) -> Self {
        self.steps.push(Step::Scanner(kind));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn build(self) -> Result<Template> {
        if self.steps.iter().rev().skip(1).any(|step| matches!(step, Step::Scanner(_))) {
            exn::bail!(ErrorKind::Template("cannot declare nodes after a scanner".to_string()));
        }
        let mut next: Option<NodeRef> = None;
        for step in self.steps.into_iter().rev() {
            let following = next.take();
            next = Some(match step {
                Step::Node(spec) => spec.link(following),
                Step::Composite(specs) => Arc::new(TemplateNode::Composite(
                    specs.into_iter().map(|spec| spec.link(following.clone())).collect(),
                )),
                Step::Scanner(kind) => Arc::new(TemplateNode::Scanner(kind)),
            });
        }
        next.map(Template::new).ok_or_raise(|| ErrorKind::Template("empty template".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_template() {
        let err = TemplateBuilder::default().build().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template(_)));
    }

    #[test]
    fn test_nodes_after_scanner() {
        let err = TemplateBuilder::default()
            .add_node(NodeSpec::metavar("session"))
            .add_scanner(ScannerKind::Dicom)
            .add_node(NodeSpec::metavar("acquisition"))
            .build()
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template(_)));
    }

    #[test]
    fn test_chain_links_in_order() {
        let template = TemplateBuilder::default()
            .add_node(NodeSpec::metavar("group"))
            .add_scanner(ScannerKind::Slurp)
            .build()
            .unwrap();
        let TemplateNode::Match(root) = template.root().as_ref() else {
            panic!("expected a match node");
        };
        let next = root.next.as_ref().unwrap();
        assert_eq!(next.scanner(), Some(ScannerKind::Slurp));
    }
}
