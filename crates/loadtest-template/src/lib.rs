//! Query templates with C-style positional placeholders.
//!
//! A template such as `g.V(%s).out().hasId(%-2$s)` is compiled once into a
//! canonical, fully positional format (`g.V(%1$s).out().hasId(%-2$s)`) and
//! then resolved against a freshly sampled [`IdChain`] on every call.
//!
//! # Placeholders
//!
//! - `%s` - next free position, assigned left to right
//! - `%N$s` - explicit 1-based position `N`
//! - `%-N$s` - "depth-up": position `max(1, L - N + 1)` where `L` is the
//!   length of the chain supplied at call time
//! - `%%` - a literal percent sign
//!
//! # Example
//!
//! ```rust
//! use loadtest_sampler::IdChain;
//! use loadtest_template::QueryTemplate;
//!
//! let template = QueryTemplate::compile("g.V(%s).out().count().toList()").unwrap();
//! assert_eq!(template.format(), "g.V(%1$s).out().count().toList()");
//!
//! let chain = IdChain::from(vec![100]);
//! assert_eq!(template.render(&chain), "g.V(100).out().count().toList()");
//! ```
//!
//! [`IdChain`]: loadtest_sampler::IdChain

mod error;
mod template;

pub use error::TemplateError;
pub use template::{QueryTemplate, SlotRef, NULL_LITERAL};
