//! REST collaborators of the hub connection core.
//!
//! Provides the cloud hub-info API, the hub configuration and participant
//! APIs, and the [`EndpointProvider`] seam through which hub-relative
//! requests are retried against another transport path.

pub mod client;
pub mod cloud;
pub mod endpoint;
pub mod error;
pub mod hub;

use std::future::Future;
use std::pin::Pin;

pub use client::RestClient;
pub use cloud::{CloudApi, HubInfoApi};
pub use endpoint::{EndpointProvider, StaticEndpoint, TokenContainer, TokenProvider};
pub use error::{ApiError, NetworkErrorKind};
pub use hub::{HubApi, HubConfigurationApi, ParticipantApi};

/// Boxed future returned by the API traits.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;
