//! Virtual machine (context group) handle

use jscore_sys::*;
use std::fmt;
use std::rc::Rc;

use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::{JscError, JscResult};

/// An isolated object space shared by one or more contexts
///
/// Wraps a `JSContextGroupRef`. Cloning shares the same machine; the group
/// is released when the last handle (including the ones held by contexts)
/// goes away. Values may move freely between contexts of one machine but
/// never across machines.
#[derive(Clone)]
pub struct JscVirtualMachine {
    inner: Rc<VmInner>,
}

struct VmInner {
    group: JSContextGroupRef,
    _token: InstanceToken,
}

impl JscVirtualMachine {
    /// Create a new machine
    pub fn new() -> JscResult<Self> {
        // SAFETY: JSContextGroupCreate has no preconditions
        let group = unsafe { JSContextGroupCreate() };
        if group.is_null() {
            return Err(JscError::context_creation("JSContextGroupCreate returned null"));
        }

        tracing::debug!(?group, "created virtual machine");
        Ok(Self {
            inner: Rc::new(VmInner {
                group,
                _token: InstanceToken::new(InstanceKind::VirtualMachine),
            }),
        })
    }

    /// The raw context group
    pub fn raw(&self) -> JSContextGroupRef {
        self.inner.group
    }

    /// Number of live handles to this machine, contexts included
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl PartialEq for JscVirtualMachine {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for JscVirtualMachine {}

impl fmt::Debug for JscVirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JscVirtualMachine({:?})", self.inner.group)
    }
}

impl Drop for VmInner {
    fn drop(&mut self) {
        tracing::debug!(group = ?self.group, "releasing virtual machine");
        // SAFETY: group was created by JSContextGroupCreate and is released once
        unsafe { JSContextGroupRelease(self.group) };
        crate::function::drop_finalized();
    }
}
