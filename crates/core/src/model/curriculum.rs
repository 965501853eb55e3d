use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::ids::{BlockId, HierarchyId, SectionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("hierarchy name cannot be empty")]
    EmptyHierarchyName,

    #[error("hierarchy base url must start with '/': {0}")]
    InvalidBaseUrl(String),

    #[error("invalid section slug: {0:?}")]
    InvalidSlug(String),

    #[error("section belongs to a different hierarchy")]
    HierarchyMismatch,

    #[error("hierarchy has no root section")]
    MissingRoot,

    #[error("hierarchy has more than one root section")]
    MultipleRoots,
}

//
// ─── HIERARCHY ─────────────────────────────────────────────────────────────────
//

/// A named curriculum tree, e.g. one per research group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub id: HierarchyId,
    pub name: String,
    pub base_url: String,
}

impl Hierarchy {
    /// # Errors
    ///
    /// Returns `CurriculumError` when the name is blank or the base url is not rooted.
    pub fn new(
        id: HierarchyId,
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, CurriculumError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(CurriculumError::EmptyHierarchyName);
        }
        let mut base_url = base_url.into();
        if !base_url.starts_with('/') {
            return Err(CurriculumError::InvalidBaseUrl(base_url));
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { id, name, base_url })
    }
}

//
// ─── SECTION ───────────────────────────────────────────────────────────────────
//

/// A page in a hierarchy.
///
/// `position` is the preorder index of the section inside its hierarchy and
/// `path` the slash-joined slugs below the root (empty for the root itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub hierarchy_id: HierarchyId,
    pub parent_id: Option<SectionId>,
    pub slug: String,
    pub label: String,
    pub depth: u32,
    pub position: u32,
    pub path: String,
}

impl Section {
    #[must_use]
    pub fn root(id: SectionId, hierarchy_id: HierarchyId) -> Self {
        Self {
            id,
            hierarchy_id,
            parent_id: None,
            slug: String::new(),
            label: "Root".to_owned(),
            depth: 0,
            position: 0,
            path: String::new(),
        }
    }

    /// Build a child of `parent` at the given preorder position.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::InvalidSlug` if the slug is not a single path segment.
    pub fn child(
        id: SectionId,
        parent: &Section,
        slug: impl Into<String>,
        label: impl Into<String>,
        position: u32,
    ) -> Result<Self, CurriculumError> {
        let slug = slug.into();
        Self::validate_slug(&slug)?;
        let path = if parent.path.is_empty() {
            slug.clone()
        } else {
            format!("{}/{}", parent.path, slug)
        };
        Ok(Self {
            id,
            hierarchy_id: parent.hierarchy_id,
            parent_id: Some(parent.id),
            slug,
            label: label.into(),
            depth: parent.depth + 1,
            position,
            path,
        })
    }

    /// A child slug is one non-empty path segment.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::InvalidSlug` otherwise.
    pub fn validate_slug(slug: &str) -> Result<(), CurriculumError> {
        if slug.is_empty() || slug.contains('/') || slug.chars().any(char::is_whitespace) {
            return Err(CurriculumError::InvalidSlug(slug.to_owned()));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Absolute URL of this section under its hierarchy.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::HierarchyMismatch` if `hierarchy` does not own the section.
    pub fn absolute_url(&self, hierarchy: &Hierarchy) -> Result<String, CurriculumError> {
        if hierarchy.id != self.hierarchy_id {
            return Err(CurriculumError::HierarchyMismatch);
        }
        if self.path.is_empty() {
            Ok(hierarchy.base_url.clone())
        } else {
            Ok(format!("{}{}/", hierarchy.base_url, self.path))
        }
    }
}

//
// ─── TREE ──────────────────────────────────────────────────────────────────────
//

/// A section as stored: parent link plus ordinal among its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    pub id: SectionId,
    pub hierarchy_id: HierarchyId,
    pub parent_id: Option<SectionId>,
    pub slug: String,
    pub label: String,
    pub ordinal: u32,
}

/// Flatten stored nodes of one hierarchy into preorder, root first.
///
/// Siblings are ordered by `(ordinal, id)`. Nodes not reachable from the root
/// are dropped.
///
/// # Errors
///
/// Returns `CurriculumError::MissingRoot`/`MultipleRoots` for malformed trees
/// and `InvalidSlug` for a stored child with an unusable slug.
pub fn preorder(nodes: Vec<SectionNode>) -> Result<Vec<Section>, CurriculumError> {
    let mut roots = nodes.iter().filter(|n| n.parent_id.is_none());
    let root_node = roots.next().ok_or(CurriculumError::MissingRoot)?;
    if roots.next().is_some() {
        return Err(CurriculumError::MultipleRoots);
    }

    let mut children: HashMap<SectionId, Vec<&SectionNode>> = HashMap::new();
    for node in &nodes {
        if let Some(parent) = node.parent_id {
            children.entry(parent).or_default().push(node);
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|n| (n.ordinal, n.id));
    }

    let mut root = Section::root(root_node.id, root_node.hierarchy_id);
    root.label.clone_from(&root_node.label);

    let mut out = Vec::with_capacity(nodes.len());
    let mut stack: Vec<Section> = vec![root];
    while let Some(section) = stack.pop() {
        if let Some(kids) = children.get(&section.id) {
            // reversed so the first sibling is popped first
            for node in kids.iter().rev() {
                stack.push(Section::child(node.id, &section, &node.slug, &node.label, 0)?);
            }
        }
        out.push(section);
    }
    for (position, section) in out.iter_mut().enumerate() {
        section.position = u32::try_from(position).unwrap_or(u32::MAX);
    }
    Ok(out)
}

//
// ─── VISITS & SUBMISSIONS ──────────────────────────────────────────────────────
//

/// One row per user and section visited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVisit {
    pub user_id: UserId,
    pub section_id: SectionId,
    pub first_visit: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
}

impl PageVisit {
    #[must_use]
    pub fn first(user_id: UserId, section_id: SectionId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            section_id,
            first_visit: at,
            last_visit: at,
        }
    }

    /// Register another visit at `at`. Out-of-order timestamps widen the window.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at < self.first_visit {
            self.first_visit = at;
        }
        if at > self.last_visit {
            self.last_visit = at;
        }
    }
}

/// A quiz block submitted by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub user_id: UserId,
    pub block_id: BlockId,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn hierarchy() -> Hierarchy {
        Hierarchy::new(HierarchyId::new(1), "a", "/pages/a").unwrap()
    }

    #[test]
    fn hierarchy_normalizes_base_url() {
        assert_eq!(hierarchy().base_url, "/pages/a/");
        assert_eq!(
            Hierarchy::new(HierarchyId::new(1), "a", "pages/a"),
            Err(CurriculumError::InvalidBaseUrl("pages/a".into()))
        );
        assert_eq!(
            Hierarchy::new(HierarchyId::new(1), "  ", "/x/"),
            Err(CurriculumError::EmptyHierarchyName)
        );
    }

    #[test]
    fn child_paths_and_urls() {
        let h = hierarchy();
        let root = Section::root(SectionId::new(1), h.id);
        let intro = Section::child(SectionId::new(2), &root, "intro", "Intro", 1).unwrap();
        let part = Section::child(SectionId::new(3), &intro, "part-1", "Part 1", 2).unwrap();

        assert!(root.is_root());
        assert_eq!(root.absolute_url(&h).unwrap(), "/pages/a/");
        assert_eq!(intro.absolute_url(&h).unwrap(), "/pages/a/intro/");
        assert_eq!(part.path, "intro/part-1");
        assert_eq!(part.depth, 2);
        assert_eq!(part.absolute_url(&h).unwrap(), "/pages/a/intro/part-1/");
    }

    #[test]
    fn child_rejects_bad_slugs() {
        let root = Section::root(SectionId::new(1), HierarchyId::new(1));
        assert!(Section::child(SectionId::new(2), &root, "", "x", 1).is_err());
        assert!(Section::child(SectionId::new(2), &root, "a/b", "x", 1).is_err());
    }

    #[test]
    fn url_requires_owning_hierarchy() {
        let other = Hierarchy::new(HierarchyId::new(9), "b", "/pages/b/").unwrap();
        let root = Section::root(SectionId::new(1), HierarchyId::new(1));
        assert_eq!(
            root.absolute_url(&other),
            Err(CurriculumError::HierarchyMismatch)
        );
    }

    fn node(id: u64, parent: Option<u64>, slug: &str, ordinal: u32) -> SectionNode {
        SectionNode {
            id: SectionId::new(id),
            hierarchy_id: HierarchyId::new(1),
            parent_id: parent.map(SectionId::new),
            slug: slug.into(),
            label: slug.to_uppercase(),
            ordinal,
        }
    }

    #[test]
    fn preorder_walks_depth_first_by_ordinal() {
        let nodes = vec![
            node(5, Some(3), "b2", 0),
            node(1, None, "", 0),
            node(3, Some(1), "b", 2),
            node(2, Some(1), "a", 1),
            node(4, Some(2), "a1", 0),
        ];
        let sections = preorder(nodes).unwrap();
        let paths: Vec<_> = sections.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["", "a", "a/a1", "b", "b/b2"]);
        let positions: Vec<_> = sections.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert_eq!(sections[2].depth, 2);
        assert_eq!(sections[1].label, "A");
    }

    #[test]
    fn preorder_requires_a_single_root() {
        assert_eq!(
            preorder(vec![node(2, Some(1), "a", 0)]),
            Err(CurriculumError::MissingRoot)
        );
        assert_eq!(
            preorder(vec![node(1, None, "", 0), node(2, None, "", 0)]),
            Err(CurriculumError::MultipleRoots)
        );
    }

    #[test]
    fn touch_keeps_first_and_advances_last() {
        let start = fixed_now();
        let mut visit = PageVisit::first(UserId::new(1), SectionId::new(2), start);
        visit.touch(start + Duration::minutes(10));
        assert_eq!(visit.first_visit, start);
        assert_eq!(visit.last_visit, start + Duration::minutes(10));

        visit.touch(start + Duration::minutes(3));
        assert_eq!(visit.last_visit, start + Duration::minutes(10));
    }
}
