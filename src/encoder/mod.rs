//! The contract shared by all format encoders.
//!
//! An encoder is a push-style state machine driven by one producer:
//! [`FeatureEncoder::on_start`], then [`FeatureEncoder::on_feature`] once per feature, then
//! [`FeatureEncoder::on_end`]. Each callback writes whatever output is final to the sink.

use std::borrow::Borrow;

use log::debug;

use crate::error::{EncodingError, Result};

mod context;
mod record;

pub use context::{EncodingContext, StreamMetadata};
pub use record::{FeatureRecord, PropertyValue};

/// A format-specific encoder of a feature stream.
///
/// Encoders are not thread-safe; each instance belongs to a single stream.
pub trait FeatureEncoder {
    /// The feature representation this encoder consumes.
    type Feature;

    fn on_start(&mut self, metadata: &StreamMetadata) -> Result<()>;

    fn on_feature(&mut self, feature: &Self::Feature) -> Result<()>;

    fn on_end(&mut self, metadata: &StreamMetadata) -> Result<()>;
}

/// Run the full lifecycle of `encoder` over `features`.
pub fn encode_features<E, I>(encoder: &mut E, metadata: &StreamMetadata, features: I) -> Result<()>
where
    E: FeatureEncoder,
    I: IntoIterator,
    I::Item: Borrow<E::Feature>,
{
    encoder.on_start(metadata)?;
    let mut count = 0usize;
    for feature in features {
        encoder.on_feature(feature.borrow())?;
        count += 1;
    }
    encoder.on_end(metadata)?;
    debug!("encoded stream of {count} features");
    Ok(())
}

/// Position of an encoder in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum EncoderState {
    #[default]
    Created,
    Started,
    Ended,
}

impl EncoderState {
    pub(crate) fn start(&mut self) -> Result<()> {
        match self {
            EncoderState::Created => {
                *self = EncoderState::Started;
                Ok(())
            }
            other => Err(EncodingError::State(format!(
                "on_start called on an encoder in state {other:?}"
            ))),
        }
    }

    pub(crate) fn check_feature(&self) -> Result<()> {
        match self {
            EncoderState::Started => Ok(()),
            other => Err(EncodingError::State(format!(
                "on_feature called on an encoder in state {other:?}"
            ))),
        }
    }

    pub(crate) fn end(&mut self) -> Result<()> {
        match self {
            EncoderState::Started => {
                *self = EncoderState::Ended;
                Ok(())
            }
            other => Err(EncodingError::State(format!(
                "on_end called on an encoder in state {other:?}"
            ))),
        }
    }
}
