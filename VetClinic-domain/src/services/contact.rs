//! Phone normalization and click-to-chat links

/// Name used in outgoing contact messages
pub const CLINIC_NAME: &str = "VetClinic";

pub(crate) const DEFAULT_PHONE: &str = "+54 351 530-1903";
pub(crate) const DEFAULT_ADDRESS: &str = "Juan Perrin 6089, Córdoba, Argentina";
pub(crate) const DEFAULT_EMAIL: &str = "contacto@vetclinic.example";

/// Keep only the ASCII digits of a phone number
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Two phones are the same contact when they match ignoring case and
/// surrounding blanks, or when their digits match
pub fn same_phone(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a.to_lowercase() == b.to_lowercase() {
        return true;
    }
    let digits = phone_digits(a);
    !digits.is_empty() && digits == phone_digits(b)
}

/// `tel:` link, empty when the phone has no digits
pub fn tel_link(phone: &str) -> String {
    let digits = phone_digits(phone);
    if digits.is_empty() {
        String::new()
    } else {
        format!("tel:+{}", digits)
    }
}

/// WhatsApp chat URL, empty when the phone has no digits
pub fn whatsapp_url(phone: &str, message: Option<&str>) -> String {
    let digits = phone_digits(phone);
    if digits.is_empty() {
        return String::new();
    }
    match message {
        Some(text) if !text.is_empty() => {
            format!("https://wa.me/{}?text={}", digits, urlencoding::encode(text))
        }
        _ => format!("https://wa.me/{}", digits),
    }
}
