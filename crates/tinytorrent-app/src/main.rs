#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]

//! Binary entrypoint: serve the RPC control plane until ctrl-c or an
//! `app-shutdown` request.

use tinytorrent_app::{AppResult, run_app};

#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
