mod client;
mod error;
mod request;
mod response;

pub mod prelude {
    pub use crate::client::HttpClientInstrumented as HttpClient;
    pub use crate::request::HttpRequest;
    pub use crate::response::{HttpResponse, JsonBody, Timings};

    // Re-exported so that scenarios don't need their own reqwest dependency to pick a method.
    pub use reqwest::Method;
}
