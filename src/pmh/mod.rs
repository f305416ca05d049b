//! OAI-PMH protocol harvester.
//!
//! - `PmhHarvester`: `ListRecords` / `ListSets` client with resumption-token
//!   pagination
//! - `PmhIterator`: concurrent iterator refilled one page at a time
//! - `parser`: namespace-aware streaming response parser
//! - `transform`: pluggable metadata element naming

mod harvester;
pub mod parser;
pub mod transform;

pub use harvester::{DEFAULT_MAX_PAGE_FAILURES, PmhHarvester, PmhIterator};
pub use parser::{OAI_NAMESPACE, PmhPage};
pub use transform::{ElementTransformer, NameValueTransformer, QualifiedNameTransformer, XmlNode};
