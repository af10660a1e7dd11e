use crate::event::{Event, Payload, RawEvent};

/// Produces at most one [`Payload`] for every [`RawEvent`].
///
/// Implementations are shared between the workers of the event pipeline, so
/// `derive` may be called concurrently.
pub trait Deriver: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns `Ok(None)` when the event must be suppressed.
    fn derive(&self, event: &RawEvent) -> Result<Option<Payload>, Self::Error>;
}

/// Wraps a [`Deriver`] to produce complete events.
/// The derived event shares the source headers, but has a new payload.
pub struct SingleEventDeriver<D> {
    name: &'static str,
    inner: D,
}

impl<D: Deriver> SingleEventDeriver<D> {
    pub fn new(name: &'static str, inner: D) -> Self {
        Self { name, inner }
    }

    /// Name of the derived event
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn derive(&self, source: &RawEvent) -> Result<Option<Event>, D::Error> {
        let payload = self.inner.derive(source)?;
        if payload.is_some() {
            log::trace!(target: self.name, "derived from {} ({})", source.name, source.header.pid);
        }
        Ok(payload.map(|payload| Event {
            header: source.header.clone(),
            payload,
        }))
    }
}
