//! Messaging deep-link construction.
//!
//! The QR images encode chat deep links: WhatsApp's `send` URL with a
//! prefilled number and text, or Telegram's `t.me` bot link with a start
//! payload. Query encoding goes through the `url` crate, so arbitrary
//! token content survives the trip.

use siniestro_common::{Error, Result};
use url::Url;

const WHATSAPP_SEND_URL: &str = "https://api.whatsapp.com/send";
const TELEGRAM_BASE_URL: &str = "https://t.me";

/// Which messenger the deep link opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    WhatsApp,
    Telegram,
}

/// Build the deep link encoded into the QR image.
///
/// `append_newline` adds one trailing newline to the prefilled text, which
/// some mobile clients treat as "send on open". Telegram links point at the
/// configured bot; the contact number only participates in the WhatsApp
/// template.
pub fn build_deep_link(
    target: LinkTarget,
    contact_number: &str,
    token: &str,
    append_newline: bool,
    telegram_bot: &str,
) -> Result<String> {
    let text = if append_newline {
        format!("{}\n", token)
    } else {
        token.to_string()
    };

    let mut url = match target {
        LinkTarget::WhatsApp => parse_base(WHATSAPP_SEND_URL)?,
        LinkTarget::Telegram => parse_base(&format!("{}/{}", TELEGRAM_BASE_URL, telegram_bot))?,
    };

    match target {
        LinkTarget::WhatsApp => {
            url.query_pairs_mut()
                .append_pair("phone", contact_number)
                .append_pair("text", &text);
        }
        LinkTarget::Telegram => {
            url.query_pairs_mut().append_pair("start", &text);
        }
    }

    Ok(url.to_string())
}

fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| Error::Encoding(format!("Invalid deep-link base {}: {}", base, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whatsapp_link() {
        let link =
            build_deep_link(LinkTarget::WhatsApp, "15551234567", "hi", false, "SiniestroBot")
                .unwrap();
        assert_eq!(link, "https://api.whatsapp.com/send?phone=15551234567&text=hi");
    }

    #[test]
    fn test_whatsapp_link_encodes_text() {
        let link = build_deep_link(
            LinkTarget::WhatsApp,
            "15551234567",
            "hola mundo",
            false,
            "SiniestroBot",
        )
        .unwrap();
        assert!(link.contains("text=hola+mundo"));
    }

    #[test]
    fn test_newline_flag_appends_encoded_newline() {
        let link =
            build_deep_link(LinkTarget::WhatsApp, "15551234567", "hi", true, "SiniestroBot")
                .unwrap();
        assert!(link.ends_with("text=hi%0A"));
    }

    #[test]
    fn test_telegram_link_targets_configured_bot() {
        let link =
            build_deep_link(LinkTarget::Telegram, "15551234567", "hi", false, "SiniestroBot")
                .unwrap();
        assert_eq!(link, "https://t.me/SiniestroBot?start=hi");
    }
}
