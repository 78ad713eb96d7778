pub mod http;
pub mod tcp;
pub mod traits;

pub use http::{DeliveryOutcome, HttpTransport, TransportError};
pub use tcp::TcpConnector;
pub use traits::{TransportConnector, TransportStream};
