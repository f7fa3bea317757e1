//! Per-connection build options.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// How text fields are written for a given client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// Bytes outside 7-bit ASCII are replaced with `?`. Safe for any
    /// client regardless of its code page.
    #[default]
    Ascii,
    /// Text is written as UTF-8, unchanged.
    Utf8,
}

/// Options that change the wire form of a packet for one recipient.
///
/// A broadcast builds each packet once per recipient with that recipient's
/// context, so two clients in the same stage may receive different bytes
/// for the same logical packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientContext {
    pub text_encoding: TextEncoding,
}

impl ClientContext {
    pub fn new(text_encoding: TextEncoding) -> Self {
        Self { text_encoding }
    }

    /// Converts `text` to the bytes this client expects.
    pub fn encode_text<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match self.text_encoding {
            TextEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            TextEncoding::Ascii if text.is_ascii() => {
                Cow::Borrowed(text.as_bytes())
            }
            TextEncoding::Ascii => Cow::Owned(
                text.chars()
                    .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                    .collect(),
            ),
        }
    }
}
