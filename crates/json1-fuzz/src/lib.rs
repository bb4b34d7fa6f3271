//! Seeded random documents and operations for property-testing `json1-ot`.
//!
//! ```
//! use json1_ot_fuzz::{random_doc, random_op, DocOptions, Fuzzer};
//!
//! let mut f = Fuzzer::from_u64(1);
//! let opts = DocOptions::default();
//! let doc = random_doc(&mut f, &opts);
//! let (op, after) = random_op(&mut f, &doc, 3, &opts)?;
//! assert_eq!(json1_ot::apply(doc, &op)?, Some(after));
//! # Ok::<(), json1_ot::Error>(())
//! ```

pub mod doc;
pub mod fuzzer;
pub mod ops;

pub use doc::{random_doc, random_value, DocOptions, NodeOdds};
pub use fuzzer::Fuzzer;
pub use ops::{random_op, random_step, StepKind};
