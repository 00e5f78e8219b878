use std::sync::Arc;

use crate::core::label::Label;
use crate::util::errors::Location;

/// A label reference plus, once the Builder has resolved it, a pointer to
/// the named item. `origin` is where the reference was written, for error
/// attribution.
#[derive(Clone, Debug)]
pub struct LabelPtrPair<T> {
    pub label: Label,
    pub origin: Option<Location>,
    pub ptr: Option<Arc<T>>,
}

impl<T> LabelPtrPair<T> {
    pub fn new(label: Label, origin: Option<Location>) -> LabelPtrPair<T> {
        LabelPtrPair {
            label,
            origin,
            ptr: None,
        }
    }

    /// The resolved item. Panics if called before the Builder filled it in.
    pub fn get(&self) -> &Arc<T> {
        self.ptr
            .as_ref()
            .expect("label reference read before resolution")
    }
}

pub type LabelTargetPair = LabelPtrPair<crate::core::target::Target>;
pub type LabelConfigPair = LabelPtrPair<crate::core::config::Config>;
pub type LabelPoolPair = LabelPtrPair<crate::core::pool::Pool>;
