use std::collections::{BTreeSet, VecDeque};

use crate::asset::PathId;
use crate::error::Result;
use crate::handle::ObjectHandle;
use crate::value::PPtrRef;

/// Returns all local objects reachable from `from` by following pointers,
/// and the pointers leading out of the asset.
pub fn reachable<T>(from: &ObjectHandle<T>) -> Result<(BTreeSet<PathId>, BTreeSet<PPtrRef>)> {
    let asset = from.asset();
    let mut queue = VecDeque::from([from.path_id()]);

    let mut locals = BTreeSet::from([from.path_id()]);
    let mut externals = BTreeSet::new();

    while let Some(node) = queue.pop_front() {
        for pptr in reachable_one(&asset.handle::<()>(node)?)? {
            if !pptr.is_local() {
                externals.insert(pptr);
                continue;
            }
            if asset.object(pptr.m_PathID).is_err() {
                tracing::trace!("Skipping dangling pointer to {}", pptr.m_PathID);
                continue;
            }
            if locals.insert(pptr.m_PathID) {
                queue.push_back(pptr.m_PathID);
            }
        }
    }

    Ok((locals, externals))
}

/// Pointers stored directly in one object.
pub fn reachable_one<T>(object: &ObjectHandle<T>) -> Result<Vec<PPtrRef>> {
    let mut pointers = Vec::new();
    object
        .value()?
        .visit_pointers(&mut |pptr| pointers.push(pptr.to_ref()));
    Ok(pointers)
}
