//! End-to-end tests across the remote store, the staging database and the agent.
