// src/services/permission_tree.rs
//
// Flat permission rows -> forest rooted at parent id 0.

use std::collections::{HashMap, HashSet};

use crate::common::error::AppError;
use crate::models::rbac::{Permission, PermissionTreeNode, TREE_ROOT};

/// Builds the permission forest from a flat snapshot.
///
/// Siblings keep their input order, so callers sort the rows first (the
/// repositories return them by parent, display order and id). Nodes whose
/// parent does not exist are dropped. Duplicate ids and parent chains that
/// loop back on themselves are rejected with a validation error.
pub fn build_tree(nodes: Vec<Permission>) -> Result<Vec<PermissionTreeNode>, AppError> {
    let mut parent_of = HashMap::with_capacity(nodes.len());
    for node in &nodes {
        if parent_of.insert(node.id, node.parent_id).is_some() {
            return Err(AppError::validation(format!(
                "Permission {} appears more than once.",
                node.id
            )));
        }
    }

    let mut groups: HashMap<i64, Vec<Permission>> = HashMap::new();
    for node in nodes {
        groups.entry(node.parent_id).or_default().push(node);
    }

    let forest = attach(TREE_ROOT, &mut groups);

    // Anything still grouped was never reached from the root.
    for node in groups.values().flatten() {
        if let Some(id) = find_cycle(node.id, &parent_of) {
            return Err(AppError::validation(format!(
                "Permission {} is part of a parent cycle.",
                id
            )));
        }
        tracing::debug!(id = node.id, parent_id = node.parent_id, "Dropping orphaned permission node");
    }

    Ok(forest)
}

// Each group is removed as it is consumed, so no node can be attached twice.
fn attach(parent_id: i64, groups: &mut HashMap<i64, Vec<Permission>>) -> Vec<PermissionTreeNode> {
    let Some(siblings) = groups.remove(&parent_id) else {
        return Vec::new();
    };

    siblings
        .into_iter()
        .map(|permission| {
            let children = attach(permission.id, groups);
            PermissionTreeNode {
                has_children: !children.is_empty(),
                children,
                permission,
            }
        })
        .collect()
}

// Follows the parent chain from `start`; returns the first id seen twice.
fn find_cycle(start: i64, parent_of: &HashMap<i64, i64>) -> Option<i64> {
    let mut seen = HashSet::new();
    let mut current = start;
    loop {
        if !seen.insert(current) {
            return Some(current);
        }
        match parent_of.get(&current) {
            Some(&parent) if parent != TREE_ROOT => current = parent,
            _ => return None,
        }
    }
}

/// Number of nodes in a forest.
pub fn count_nodes(forest: &[PermissionTreeNode]) -> usize {
    forest.iter().map(|n| 1 + count_nodes(&n.children)).sum()
}
