//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the process
//! surface (configuration, telemetry, metrics, health endpoint).

/// WebSocket push client with backoff reconnects.
pub mod push;

/// HTTP client for the REST query boundary.
pub mod rest;

/// Configuration loading.
pub mod config;

/// Health check and view read HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
