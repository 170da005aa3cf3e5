//! Change verification: snapshot the tree, audit after a pass, and fail
//! loudly when a mutation went unreported.
//!
//! The contract: a pass that mutates anything under a change scope (a
//! script or function) must bump that scope's change stamp through the
//! compiler, and a pass that detaches a function must additionally report
//! the function deleted. The verifier holds a structural fingerprint per
//! change scope from snapshot time and compares on audit.

use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::{Hash, Hasher};

use stoat_ast::{AstArena, NodeId};

/// A fatal audit failure; the pass manager converts this into an internal
/// compiler error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{message} (while verifying pass {pass_name})")]
pub struct ChangeVerifierError {
    pub pass_name: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ChangeVerifier {
    /// Fingerprint of each change scope's own content at snapshot time.
    fingerprints: FxHashMap<NodeId, u64>,
    /// The compiler's change counter when the snapshot was taken. A
    /// scope is "marked" when its stamp is newer than this.
    snapshot_version: u32,
}

impl ChangeVerifier {
    pub fn snapshot(arena: &AstArena, root: NodeId, current_stamp: u32) -> Self {
        let mut fingerprints = FxHashMap::default();
        for scope in change_scopes(arena, root) {
            fingerprints.insert(scope, fingerprint(arena, scope));
        }
        ChangeVerifier {
            fingerprints,
            snapshot_version: current_stamp,
        }
    }

    /// Verify that every structural difference from the snapshot was
    /// reported: changed scopes stamped, deleted functions reported, and
    /// nothing live reported deleted.
    pub fn check_recorded_changes(
        &self,
        pass_name: &str,
        arena: &AstArena,
        root: NodeId,
        deleted: &FxHashSet<NodeId>,
    ) -> Result<(), ChangeVerifierError> {
        let err = |message: String| {
            Err(ChangeVerifierError {
                pass_name: pass_name.to_string(),
                message,
            })
        };

        let current: Vec<NodeId> = change_scopes(arena, root).collect();
        let current_set: FxHashSet<NodeId> = current.iter().copied().collect();

        for &scope in &current {
            let marked = arena.change_stamp(scope) > self.snapshot_version;
            match self.fingerprints.get(&scope) {
                Some(&old) => {
                    if fingerprint(arena, scope) != old && !marked {
                        return err(format!(
                            "changed scope not marked as changed: {scope}"
                        ));
                    }
                }
                None => {
                    if !marked {
                        return err(format!(
                            "new scope not explicitly marked as changed: {scope}"
                        ));
                    }
                }
            }
            if deleted.contains(&scope) {
                return err(format!(
                    "existing scope is improperly marked as deleted: {scope}"
                ));
            }
        }

        for &scope in self.fingerprints.keys() {
            if !current_set.contains(&scope) && !deleted.contains(&scope) {
                return err(format!("deleted scope was not reported: {scope}"));
            }
        }

        Ok(())
    }
}

/// All change-scope roots reachable from `root`, `root` included.
fn change_scopes(arena: &AstArena, root: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    arena
        .preorder(root)
        .into_iter()
        .filter(|&n| arena.kind(n).is_change_scope_root())
}

/// Structural fingerprint of one change scope: node kinds and identities
/// down to, but not across, nested change scopes. Nested scopes
/// contribute their identity only, so a change inside a nested function
/// does not implicate the enclosing script.
fn fingerprint(arena: &AstArena, scope: NodeId) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    hash_subtree(arena, scope, scope, &mut hasher);
    hasher.finish()
}

fn hash_subtree(arena: &AstArena, node: NodeId, scope: NodeId, hasher: &mut rustc_hash::FxHasher) {
    node.0.hash(hasher);
    std::mem::discriminant(arena.kind(node)).hash(hasher);
    if node != scope && arena.kind(node).is_change_scope_root() {
        return;
    }
    let children = arena.children(node);
    children.len().hash(hasher);
    for &c in children {
        hash_subtree(arena, c, scope, hasher);
    }
}
