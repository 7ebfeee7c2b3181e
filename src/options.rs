//! Connection options consulted by the frame reader and writer.
//!
//! [`Options`] is a plain value. Connections clone it when they are opened,
//! so changing an `Options` afterwards only affects connections opened
//! later.

use std::time::Duration;

use thiserror::Error;

/// Default ceiling for a single frame payload and for a reassembled message.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 4 * 1024 * 1024;

/// Default bound applied to each transport read.
pub const DEFAULT_SOCKET_RECEIVE_TIMEOUT: Duration = Duration::from_millis(200);

/// Default time allowed for the server to accept the opening handshake.
pub const DEFAULT_OPEN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for the server to answer a close frame.
pub const DEFAULT_CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Rejected option values.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    /// Frame payload ceiling must be positive.
    #[error("frame payload ceiling must be greater than zero")]
    ZeroFramePayloadSize,
    /// Message payload ceiling must be at least the frame payload ceiling.
    #[error("message payload ceiling {message} is below frame payload ceiling {frame}")]
    MessageSmallerThanFrame {
        /// Rejected message ceiling.
        message: usize,
        /// Frame ceiling currently in force.
        frame: usize,
    },
    /// A receive timeout of zero would never allow a read to complete.
    #[error("socket receive timeout must be greater than zero")]
    ZeroReceiveTimeout,
    /// A zero handshake timeout would fail every handshake.
    #[error("{handshake} handshake timeout must be greater than zero")]
    ZeroHandshakeTimeout {
        /// `"opening"` or `"closing"`.
        handshake: &'static str,
    },
}

/// Limits and toggles for a WebSocket connection.
///
/// # Examples
///
/// ```
/// use wampframe::Options;
///
/// let mut options = Options::default();
/// options.set_max_frame_payload_size(1024).unwrap();
/// options.set_receive_text_as_raw(true);
///
/// assert_eq!(options.max_frame_payload_size(), 1024);
/// assert!(options.receive_text_as_raw());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    max_frame_payload_size: usize,
    max_message_payload_size: usize,
    receive_text_as_raw: bool,
    validate_incoming_utf8: bool,
    mask_outgoing_frames: bool,
    tcp_nodelay: bool,
    socket_receive_timeout: Option<Duration>,
    open_handshake_timeout: Option<Duration>,
    close_handshake_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_frame_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_message_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            receive_text_as_raw: false,
            validate_incoming_utf8: true,
            mask_outgoing_frames: true,
            tcp_nodelay: true,
            socket_receive_timeout: Some(DEFAULT_SOCKET_RECEIVE_TIMEOUT),
            open_handshake_timeout: Some(DEFAULT_OPEN_HANDSHAKE_TIMEOUT),
            close_handshake_timeout: Some(DEFAULT_CLOSE_HANDSHAKE_TIMEOUT),
        }
    }
}

impl Options {
    /// Largest payload accepted in a single incoming frame.
    #[must_use]
    pub const fn max_frame_payload_size(&self) -> usize { self.max_frame_payload_size }

    /// Largest payload accepted for a reassembled incoming message.
    #[must_use]
    pub const fn max_message_payload_size(&self) -> usize { self.max_message_payload_size }

    /// Deliver text messages as validated bytes rather than `String`s.
    #[must_use]
    pub const fn receive_text_as_raw(&self) -> bool { self.receive_text_as_raw }

    /// Validate incoming text payloads as UTF-8 while they stream in.
    #[must_use]
    pub const fn validate_incoming_utf8(&self) -> bool { self.validate_incoming_utf8 }

    /// Mask outgoing frame payloads with a fresh random key.
    #[must_use]
    pub const fn mask_outgoing_frames(&self) -> bool { self.mask_outgoing_frames }

    /// Disable Nagle's algorithm on TCP transports.
    #[must_use]
    pub const fn tcp_nodelay(&self) -> bool { self.tcp_nodelay }

    /// Upper bound for a single transport read, or `None` to wait
    /// indefinitely.
    #[must_use]
    pub const fn socket_receive_timeout(&self) -> Option<Duration> { self.socket_receive_timeout }

    /// Time allowed between sending the handshake request and the server's
    /// `101` response, or `None` to wait indefinitely.
    #[must_use]
    pub const fn open_handshake_timeout(&self) -> Option<Duration> { self.open_handshake_timeout }

    /// Time allowed for the server to answer our close frame before the
    /// transport is dropped, or `None` to wait indefinitely.
    #[must_use]
    pub const fn close_handshake_timeout(&self) -> Option<Duration> { self.close_handshake_timeout }

    /// Set the frame payload ceiling.
    ///
    /// Raising the frame ceiling above the message ceiling raises the message
    /// ceiling to match.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::ZeroFramePayloadSize`] for `0`. The previous
    /// value is kept.
    pub fn set_max_frame_payload_size(&mut self, size: usize) -> Result<(), OptionsError> {
        if size == 0 {
            return Err(OptionsError::ZeroFramePayloadSize);
        }
        self.max_frame_payload_size = size;
        if self.max_message_payload_size < size {
            self.max_message_payload_size = size;
        }
        Ok(())
    }

    /// Set the reassembled message ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::MessageSmallerThanFrame`] when `size` is below
    /// the frame ceiling. The previous value is kept.
    pub fn set_max_message_payload_size(&mut self, size: usize) -> Result<(), OptionsError> {
        if size < self.max_frame_payload_size {
            return Err(OptionsError::MessageSmallerThanFrame {
                message: size,
                frame: self.max_frame_payload_size,
            });
        }
        self.max_message_payload_size = size;
        Ok(())
    }

    /// Choose between `String` and byte delivery for text messages.
    pub fn set_receive_text_as_raw(&mut self, enabled: bool) { self.receive_text_as_raw = enabled; }

    /// Enable or disable incremental UTF-8 validation of text payloads.
    pub fn set_validate_incoming_utf8(&mut self, enabled: bool) {
        self.validate_incoming_utf8 = enabled;
    }

    /// Enable or disable masking of outgoing frames.
    ///
    /// Servers are required to reject unmasked client frames, so this is only
    /// useful against test peers.
    pub fn set_mask_outgoing_frames(&mut self, enabled: bool) { self.mask_outgoing_frames = enabled; }

    /// Enable or disable `TCP_NODELAY`.
    pub fn set_tcp_nodelay(&mut self, enabled: bool) { self.tcp_nodelay = enabled; }

    /// Bound each transport read.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::ZeroReceiveTimeout`] for a zero duration. The
    /// previous value is kept.
    pub fn set_socket_receive_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(), OptionsError> {
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(OptionsError::ZeroReceiveTimeout);
        }
        self.socket_receive_timeout = timeout;
        Ok(())
    }

    /// Bound the wait for the server's handshake response.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::ZeroHandshakeTimeout`] for a zero duration.
    /// The previous value is kept.
    pub fn set_open_handshake_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(), OptionsError> {
        self.open_handshake_timeout = handshake_timeout("opening", timeout)?;
        Ok(())
    }

    /// Bound the wait for the server's reply to our close frame.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::ZeroHandshakeTimeout`] for a zero duration.
    /// The previous value is kept.
    pub fn set_close_handshake_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(), OptionsError> {
        self.close_handshake_timeout = handshake_timeout("closing", timeout)?;
        Ok(())
    }
}

fn handshake_timeout(
    handshake: &'static str,
    timeout: Option<Duration>,
) -> Result<Option<Duration>, OptionsError> {
    if timeout.is_some_and(|t| t.is_zero()) {
        return Err(OptionsError::ZeroHandshakeTimeout { handshake });
    }
    Ok(timeout)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::{fixture, rstest};

    use super::{DEFAULT_MAX_PAYLOAD_SIZE, Options, OptionsError};

    #[fixture]
    fn options() -> Options { Options::default() }

    #[rstest]
    fn defaults_match_documented_values(options: Options) {
        assert_eq!(options.max_frame_payload_size(), DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(options.max_message_payload_size(), 4 * 1024 * 1024);
        assert!(!options.receive_text_as_raw());
        assert!(options.validate_incoming_utf8());
        assert!(options.mask_outgoing_frames());
        assert!(options.tcp_nodelay());
        assert_eq!(
            options.socket_receive_timeout(),
            Some(Duration::from_millis(200))
        );
        assert_eq!(options.open_handshake_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.close_handshake_timeout(), Some(Duration::from_secs(1)));
    }

    #[rstest]
    fn zero_frame_size_keeps_previous_value(mut options: Options) {
        assert_eq!(
            options.set_max_frame_payload_size(0),
            Err(OptionsError::ZeroFramePayloadSize)
        );
        assert_eq!(options.max_frame_payload_size(), DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[rstest]
    fn message_ceiling_cannot_drop_below_frame_ceiling(mut options: Options) {
        options
            .set_max_frame_payload_size(1024)
            .expect("positive frame size");
        let err = options
            .set_max_message_payload_size(512)
            .expect_err("message ceiling below frame ceiling");
        assert_eq!(
            err,
            OptionsError::MessageSmallerThanFrame {
                message: 512,
                frame: 1024,
            }
        );
        assert_eq!(options.max_message_payload_size(), DEFAULT_MAX_PAYLOAD_SIZE);
        options
            .set_max_message_payload_size(1024)
            .expect("equal ceilings are allowed");
        assert_eq!(options.max_message_payload_size(), 1024);
    }

    #[rstest]
    fn raising_frame_ceiling_lifts_message_ceiling(mut options: Options) {
        options
            .set_max_frame_payload_size(8 * 1024 * 1024)
            .expect("positive frame size");
        assert_eq!(options.max_message_payload_size(), 8 * 1024 * 1024);
    }

    #[rstest]
    fn zero_receive_timeout_is_rejected(mut options: Options) {
        assert_eq!(
            options.set_socket_receive_timeout(Some(Duration::ZERO)),
            Err(OptionsError::ZeroReceiveTimeout)
        );
        options
            .set_socket_receive_timeout(None)
            .expect("no timeout is allowed");
        assert_eq!(options.socket_receive_timeout(), None);
    }

    #[rstest]
    fn zero_handshake_timeouts_keep_previous_value(mut options: Options) {
        assert_eq!(
            options.set_open_handshake_timeout(Some(Duration::ZERO)),
            Err(OptionsError::ZeroHandshakeTimeout {
                handshake: "opening"
            })
        );
        assert_eq!(
            options.set_close_handshake_timeout(Some(Duration::ZERO)),
            Err(OptionsError::ZeroHandshakeTimeout {
                handshake: "closing"
            })
        );
        assert_eq!(options.open_handshake_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.close_handshake_timeout(), Some(Duration::from_secs(1)));

        options
            .set_open_handshake_timeout(Some(Duration::from_millis(50)))
            .expect("positive timeout");
        options
            .set_close_handshake_timeout(None)
            .expect("no timeout is allowed");
        assert_eq!(options.open_handshake_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(options.close_handshake_timeout(), None);
    }

    #[rstest]
    fn clones_are_independent(mut options: Options) {
        let snapshot = options.clone();
        options.set_mask_outgoing_frames(false);
        assert!(snapshot.mask_outgoing_frames());
    }
}
