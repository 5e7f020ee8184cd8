//! Subsite pairing
//!
//! Descendants of both roots are enumerated depth-first, pre-order. Each
//! source descendant is paired with the destination descendant whose path
//! equals its remapped path under the root rule. Unpaired source nodes are
//! reported, never created.

use crate::error::RemoteError;
use crate::port::SiteSession;
use crate::retry::ThrottlePolicy;
use permigrate_model::{Node, RemapRule};

/// Outcome of pairing source descendants with destination descendants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsiteMatch {
    /// (source, destination) pairs in source pre-order
    pub pairs: Vec<(Node, Node)>,
    /// Source nodes with no destination counterpart
    pub unmatched: Vec<Node>,
}

/// Every node below `root`, depth-first pre-order
///
/// # Errors
/// Propagates the first enumeration failure.
pub async fn enumerate_descendants(
    session: &dyn SiteSession,
    root: &Node,
    throttle: &ThrottlePolicy,
) -> Result<Vec<Node>, RemoteError> {
    let mut found = Vec::new();
    let mut stack = list_children(session, &root.url, throttle).await?;

    while let Some(node) = stack.pop() {
        let children = list_children(session, &node.url, throttle).await?;
        found.push(node);
        stack.extend(children);
    }

    Ok(found)
}

/// Immediate children of `parent_url`, reversed for stack order
async fn list_children(
    session: &dyn SiteSession,
    parent_url: &str,
    throttle: &ThrottlePolicy,
) -> Result<Vec<Node>, RemoteError> {
    let mut children = throttle
        .call("list_subsites", move || session.list_subsites(parent_url))
        .await?;
    children.reverse();
    Ok(children)
}

/// Pair source descendants with destination descendants
#[must_use]
pub fn match_subsites(rule: &RemapRule, source: &[Node], dest: &[Node]) -> SubsiteMatch {
    let mut result = SubsiteMatch::default();
    for node in source {
        let counterpart = rule
            .remap(&node.url)
            .mapped()
            .and_then(|target| dest.iter().find(|d| d.path() == target));
        match counterpart {
            Some(d) => result.pairs.push((node.clone(), d.clone())),
            None => result.unmatched.push(node.clone()),
        }
    }
    result
}

/// Whether `path` lies strictly below any of `roots`
#[must_use]
pub fn is_below_any(path: &str, roots: &[String]) -> bool {
    roots
        .iter()
        .any(|root| path.strip_prefix(root.as_str()).is_some_and(|rest| rest.starts_with('/')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn child(url: &str, parent: &str) -> Node {
        Node::new(url, "").with_parent(parent)
    }

    #[test]
    fn pairs_by_remapped_path() {
        let rule = RemapRule::new("/sites/A", "/sites/B");
        let source = vec![
            child("/sites/A/x", "/sites/A"),
            child("/sites/A/x/y", "/sites/A/x"),
            child("/sites/A/z", "/sites/A"),
        ];
        let dest = vec![child("/sites/B/x", "/sites/B"), child("/sites/B/x/y", "/sites/B/x")];

        let matched = match_subsites(&rule, &source, &dest);
        assert_eq!(matched.pairs.len(), 2);
        assert_eq!(matched.pairs[1].1.url, "/sites/B/x/y");
        assert_eq!(matched.unmatched, vec![child("/sites/A/z", "/sites/A")]);
    }

    #[test]
    fn below_any_requires_separator() {
        let failed = vec!["/sites/A/x".to_string()];
        assert!(is_below_any("/sites/A/x/y", &failed));
        assert!(!is_below_any("/sites/A/x", &failed));
        assert!(!is_below_any("/sites/A/xy", &failed));
    }
}
