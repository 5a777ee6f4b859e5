//! Inbound mail handling: parsing, routing and the fetch loop

mod parser;
mod router;
mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use parser::{parse_message, ParsedAttachment, ParsedMessage};
pub use router::{Delivery, InboundMail, MailRouter, RoutingOutcome, REJECTION_MESSAGE};
pub use sync::{FetchBatch, FetchedMail, HttpInboundApi, InboundApi, MailSync};
