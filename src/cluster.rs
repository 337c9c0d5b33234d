mod member;
pub use member::*;

mod router;
pub use router::*;

mod transport;
pub use transport::*;
