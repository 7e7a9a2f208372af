// Llama Chat Engine — runtime layer
// History, prompt construction, stream reconciliation, and the exchange
// orchestrator that drives the hosted completion endpoint.

pub mod chat;
pub mod http;
pub mod prompt;
pub mod providers;
pub mod reconcile;
pub mod sessions;
pub mod types;
