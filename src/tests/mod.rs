//! End-to-end tests against a mocked Etherpad HTTP API.

mod purge_e2e;
