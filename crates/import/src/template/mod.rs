//! The template node graph that classifies directory names.
//!
//! A template is a chain of nodes, one per directory level. Matching a
//! directory name against a node writes whatever it captures into the
//! [`DiscoveryContext`] and hands back the node for the level below.
//!
//! ```
//! use hoist_hierarchy::DiscoveryContext;
//! use hoist_import::template::Template;
//!
//! let template: Template = "{group}:{project}:sub-{subject}".parse().unwrap();
//! let mut ctx = DiscoveryContext::default();
//! let next = template.root().extract_metadata("scitran", &mut ctx).unwrap().unwrap();
//! let next = next.extract_metadata("Anxiety Study", &mut ctx).unwrap().unwrap();
//! next.extract_metadata("sub-01", &mut ctx).unwrap();
//! assert_eq!(ctx.subject.unwrap().label.as_deref(), Some("01"));
//! ```

mod builder;
mod parse;
mod pattern;

pub use self::builder::{NodeSpec, TemplateBuilder};
pub use self::pattern::{alias, compile_pattern, compile_regex, decode_name, encode_name};
use crate::error::{ErrorKind, Result};
use crate::scanner::ScannerKind;
use exn::ResultExt;
use hoist_hierarchy::DiscoveryContext;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

pub type NodeRef = Arc<TemplateNode>;

/// Extra metadata extraction run after a node matches.
pub type MetadataFn = Arc<dyn Fn(&str, &mut DiscoveryContext) + Send + Sync>;

/// How a [`MatchNode`] decides whether a directory name matches.
#[derive(Clone, Debug)]
pub enum Matcher {
    /// Every name matches; nothing is captured
    Any,
    /// Every name matches and is stored under this (aliased) key
    Metavar(String),
    /// Only this exact name matches
    Literal(String),
    /// The whole name must match; named captures are stored
    Pattern(Regex),
}

pub struct MatchNode {
    pub matcher: Matcher,
    /// Makes the matched directory a packfile of this type
    pub packfile_type: Option<String>,
    pub packfile_name: Option<String>,
    pub metadata_fn: Option<MetadataFn>,
    pub next: Option<NodeRef>,
}

impl fmt::Debug for MatchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchNode")
            .field("matcher", &self.matcher)
            .field("packfile_type", &self.packfile_type)
            .field("packfile_name", &self.packfile_name)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum TemplateNode {
    Match(MatchNode),
    /// The first child that matches wins
    Composite(Vec<NodeRef>),
    /// Nothing below is matched; the subtree is packfile contents
    Terminal,
    /// Discovery below hands over to a scanner
    Scanner(ScannerKind),
}

enum Outcome {
    Rejected,
    Matched(Option<NodeRef>),
}

impl MatchNode {
    fn try_match(&self, name: &str, ctx: &mut DiscoveryContext) -> Result<Outcome> {
        let values = match &self.matcher {
            Matcher::Any => Vec::new(),
            Matcher::Metavar(key) => vec![(alias(key).to_string(), name.to_string())],
            Matcher::Literal(literal) if literal == name => Vec::new(),
            Matcher::Literal(_) => return Ok(Outcome::Rejected),
            Matcher::Pattern(regex) => match pattern::captures(regex, name) {
                Some(values) => values,
                None => return Ok(Outcome::Rejected),
            },
        };
        for (key, value) in values {
            ctx.set(&key, value).or_raise(|| ErrorKind::Template(format!("cannot store {key}")))?;
        }
        if let Some(metadata_fn) = &self.metadata_fn {
            metadata_fn(name, ctx);
        }
        if let Some(packfile_type) = &self.packfile_type {
            ctx.packfile = Some(packfile_type.clone());
            ctx.packfile_name.clone_from(&self.packfile_name);
            return Ok(Outcome::Matched(Some(Arc::new(TemplateNode::Terminal))));
        }
        Ok(Outcome::Matched(self.next.clone()))
    }
}

impl TemplateNode {
    /// Match a directory name, updating `ctx`.
    ///
    /// Returns the node to use one level down. `None` means either no match
    /// (the context is left untouched) or a match with nothing below it;
    /// both are handled the same way by discovery.
    pub fn extract_metadata(&self, name: &str, ctx: &mut DiscoveryContext) -> Result<Option<NodeRef>> {
        match self.try_match(name, ctx)? {
            Outcome::Matched(next) => Ok(next),
            Outcome::Rejected => Ok(None),
        }
    }

    fn try_match(&self, name: &str, ctx: &mut DiscoveryContext) -> Result<Outcome> {
        match self {
            TemplateNode::Match(node) => node.try_match(name, ctx),
            TemplateNode::Composite(children) => {
                for child in children {
                    let mut trial = ctx.clone();
                    if let Outcome::Matched(next) = child.try_match(name, &mut trial)? {
                        *ctx = trial;
                        return Ok(Outcome::Matched(next));
                    }
                }
                Ok(Outcome::Rejected)
            },
            TemplateNode::Terminal | TemplateNode::Scanner(_) => Ok(Outcome::Rejected),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TemplateNode::Terminal)
    }

    pub fn scanner(&self) -> Option<ScannerKind> {
        match self {
            TemplateNode::Scanner(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// A compiled, immutable template.
#[derive(Clone, Debug)]
pub struct Template {
    root: NodeRef,
}

impl Template {
    pub fn new(root: NodeRef) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }
}
