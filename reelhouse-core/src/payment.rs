//! Redirect URLs handed to the payment processor's checkout page.

use crate::{ChannelId, ValidationError};
use std::fmt;

const SUCCESS_PATH: &str = "/payment-success";
const FAILURE_PATH: &str = "/payment-failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentKind {
    Subscription,
    Donation,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Subscription => "subscription",
            PaymentKind::Donation => "donation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subscription" => Some(PaymentKind::Subscription),
            "donation" => Some(PaymentKind::Donation),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success and cancel URLs for one checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl PaymentUrls {
    pub fn new(
        base_url: &str,
        kind: PaymentKind,
        channel_id: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let base = base_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ValidationError::InvalidValue {
                field: "base_url".to_string(),
                reason: "must be an absolute http(s) url".to_string(),
            });
        }

        let mut success_url = format!("{}{}?type={}", base, SUCCESS_PATH, kind);
        if let Some(channel_id) = channel_id {
            success_url.push_str("&channelId=");
            success_url.push_str(channel_id);
        }
        let cancel_url = format!("{}{}?type={}", base, FAILURE_PATH, kind);

        Ok(Self {
            success_url,
            cancel_url,
        })
    }
}

/// What the payment success page learns from its query string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaymentRedirect {
    pub kind: Option<PaymentKind>,
    pub channel_id: Option<ChannelId>,
}

impl PaymentRedirect {
    /// Parse `type=...&channelId=...`, with or without a leading `?`.
    /// Unknown keys are ignored.
    pub fn parse(query: &str) -> Self {
        let mut redirect = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "type" => redirect.kind = PaymentKind::parse(value),
                "channelId" if !value.is_empty() => redirect.channel_id = Some(value.to_string()),
                _ => {}
            }
        }
        redirect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_urls_carry_channel() {
        let urls = PaymentUrls::new("https://reel.example/", PaymentKind::Subscription, Some("c1")).unwrap();
        assert_eq!(
            urls.success_url,
            "https://reel.example/payment-success?type=subscription&channelId=c1"
        );
        assert_eq!(urls.cancel_url, "https://reel.example/payment-failure?type=subscription");
    }

    #[test]
    fn test_relative_base_is_rejected() {
        assert!(PaymentUrls::new("reel.example", PaymentKind::Donation, None).is_err());
    }

    #[test]
    fn test_redirect_parse() {
        let urls = PaymentUrls::new("http://localhost:3000", PaymentKind::Donation, Some("c9")).unwrap();
        let query = urls.success_url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        let redirect = PaymentRedirect::parse(query);
        assert_eq!(redirect.kind, Some(PaymentKind::Donation));
        assert_eq!(redirect.channel_id.as_deref(), Some("c9"));

        let empty = PaymentRedirect::parse("?type=refund&other");
        assert_eq!(empty, PaymentRedirect::default());
    }
}
