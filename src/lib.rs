//! Tunnels a reference-data lookup over plain TCP to a backend resolver.
//!
//! One connection carries exactly one exchange: the client writes a JSON
//! request, closes its write half to mark it complete, and reads the JSON
//! reply until the server closes. The request names a set of securities and
//! a set of fields; the reply maps each security to its resolved values.
//!
//! Modules:
//! - [`query`]: request decoding and validation
//! - [`reply`]: the result model and page merging
//! - [`resolver`]: the backend resolution capability
//! - [`server`]: connection acceptor and exchange handler
//! - [`client`]: reference requester
//! - [`config`]: CLI and TOML configuration

pub mod client;
pub mod config;
pub mod query;
pub mod reply;
pub mod resolver;
pub mod server;
