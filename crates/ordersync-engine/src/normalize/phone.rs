//! Phone number canonicalization

use ordersync_common::RawOrder;

/// Number of trailing digits kept; drops country codes such as `+1`
pub const PHONE_DIGITS: usize = 10;

/// Strip everything but ASCII digits and keep the last [`PHONE_DIGITS`].
///
/// Returns `None` when the input holds no digits at all.
pub fn canonical_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(PHONE_DIGITS);
    Some(digits[start..].to_string())
}

/// First usable phone from the order, shipping address, then billing address
pub fn pick_phone(order: &RawOrder) -> Option<String> {
    let shipping = order.shipping_address.as_ref().and_then(|a| a.phone.as_deref());
    let billing = order.billing_address.as_ref().and_then(|a| a.phone.as_deref());

    [order.phone.as_deref(), shipping, billing]
        .into_iter()
        .flatten()
        .find_map(canonical_phone)
}
