//! # dcfl-core: Discrete-Choice Facility Location Core
//!
//! Data model for competitive facility location and pricing problems where
//! customers choose among alternatives by maximizing a random utility.
//!
//! ## Model
//!
//! - **Facilities** are either leader-owned *candidates* (open or closed, priced
//!   from a finite menu) or *existing* alternatives with a fixed price.
//! - **Customers** carry a population weight.
//! - **Scenarios** are equally likely draws of the random utility term `xi`.
//!
//! ```text
//! U[i,n,r](p) = exo_utility[i,n,r] + endo_coef[i,n,r] · p + xi[i,n,r]
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use dcfl_core::{InstanceBuilder, UtilityTerms};
//!
//! let instance = InstanceBuilder::new("toy", 1)
//!     .customer("downtown", 10.0)
//!     .existing("opt-out", 1, 0.0)
//!     .candidate("store", 5.0, vec![1.0, 2.0])
//!     .utilities(|i, _n, _r| {
//!         if i == 0 {
//!             UtilityTerms::new(0.0, 0.0, 0.0)
//!         } else {
//!             UtilityTerms::new(3.0, -1.0, 0.0)
//!         }
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(instance.num_facilities(), 2);
//! ```
//!
//! ## ID System
//!
//! Every element has a zero-based newtype ID matching its position in the
//! instance vectors, so IDs double as indices into the utility tensors.

use serde::{Deserialize, Serialize};

pub mod error;
pub mod instance;

pub use error::{DcflError, DcflResult};
pub use instance::{
    Customer, Facility, FacilityKind, Instance, InstanceBuilder, OpenLimits, StrategyProfile,
    UtilityTerms,
};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(usize);

impl FacilityId {
    #[inline]
    pub fn new(value: usize) -> Self {
        FacilityId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl CustomerId {
    #[inline]
    pub fn new(value: usize) -> Self {
        CustomerId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl OperatorId {
    #[inline]
    pub fn new(value: usize) -> Self {
        OperatorId(value)
    }

    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}
