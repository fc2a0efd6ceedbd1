//! Integration tests for salesync-channels
//!
//! Uses wiremock to stand in for the marketplace APIs and verifies the
//! full adapter path: payload building, the HTTP call, error
//! classification and response parsing.

mod common;

mod test_client;
mod test_rest_adapters;
mod test_graphql_and_accounting;
