//! Change events, the notification outbox and its delivery.
//!
//! - [`store`]: the [`OutboxStore`] port with Postgres and in-memory adapters.
//! - [`payload`]: the JSON document stored on each outbox row.
//! - [`template`]: renders a payload into subject, text and HTML.
//! - [`delivery`]: channel providers (SMTP email, HTTP messaging gateway).
//! - [`dispatcher`]: claim, send and retry one batch of outbox rows.

pub mod delivery;
pub mod dispatcher;
pub mod payload;
pub mod store;
pub mod template;

pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::gateway::{GatewayConfig, GatewayDelivery};
pub use delivery::{ChannelProvider, DeliveryError, OutgoingMessage};
pub use dispatcher::{DispatchError, DispatchOptions, DispatchSummary, OutboxDispatcher};
pub use payload::OutboxPayload;
pub use store::memory::MemoryOutboxStore;
pub use store::postgres::PgOutboxStore;
pub use store::{NewDelivery, NewEvent, OutboxStore};
pub use template::{RenderedMessage, TemplateRenderer};
