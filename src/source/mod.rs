// Remote collaborators: media transport and network reachability.

pub mod connectivity;
pub mod http_source;
pub mod traits;
