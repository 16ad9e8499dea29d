//! Sink and consumer abstraction.
//!
//! A [`Sinker`] is one destination: a filter chain, a set of consumers and
//! a failure policy. A [`Consumer`] writes the changes of one mapped table.
//! [`deliver`] applies the fan-out rules shared by every destination kind.

mod deliver;
mod traits;

pub use deliver::{deliver, dispatch_consumers, Delivery};
pub use traits::{Consumer, Sinker};
