/*! Integration tests for Chorus.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - transaction: Acquisition protocol, origin reuse, read-only enforcement
 * - identity: Wrapper identity stability through the identity cache
 * - events: Observer callbacks and asynchronous event streams
 * - document: Root access, update exchange, validation hook
 * - shared: Map, Array and Text wrapper operations
 * - serialization: Snapshot round trips
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("chorus=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod document;
mod events;
mod helpers;
mod serialization;
mod transaction;
