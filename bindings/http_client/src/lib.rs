mod client;
mod request;

pub mod prelude {
    pub use crate::client::HttpClientInstrumented;
    pub use crate::request::InstrumentedRequest;

    pub use stampede_instruments::{Check, Outcome};
}
