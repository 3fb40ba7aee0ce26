//! Query composition for trigger passes.
//!
//! Every trigger pass visits entities that carry the three components the
//! trigger job reads: [`AbilitySequence`], [`Target`] and the category's
//! [`EffectSequence<T>`]. The pass's [`ContextWriter`](crate::writer::ContextWriter)
//! can demand more (caster stats, position, ...). [`compose`] merges the two by
//! plain list concatenation; duplicated terms are kept and are harmless.
//!
//! # Example
//!
//! ```
//! use volley_core::effect::{Affects, EffectPayload};
//! use volley_core::query::{base_requirement, compose};
//! use volley_core::QueryDesc;
//!
//! #[derive(Clone)]
//! struct Burn;
//! impl EffectPayload for Burn {
//!     fn affects(&self) -> Affects { Affects::Target }
//! }
//!
//! #[derive(Clone)]
//! struct Heat(f32);
//!
//! let query = compose::<Burn>(&QueryDesc::new().with::<Heat>());
//! assert_eq!(query.all.len(), base_requirement::<Burn>().all.len() + 1);
//! ```

use crate::ability::{AbilitySequence, Target};
use crate::effect::{EffectPayload, EffectSequence};
use crate::QueryDesc;

/// The fixed requirement of every trigger pass for category `T`.
#[must_use]
pub fn base_requirement<T: EffectPayload>() -> QueryDesc {
    QueryDesc::new()
        .with::<AbilitySequence>()
        .with::<Target>()
        .with::<EffectSequence<T>>()
}

/// Merges the base requirement for `T` with a category-specific one.
#[must_use]
pub fn compose<T: EffectPayload>(custom: &QueryDesc) -> QueryDesc {
    base_requirement::<T>().merge(custom)
}
