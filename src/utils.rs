/// Strip everything but digits from a phone number, so that
/// `"+1 (555) 123-4567"` becomes `"15551234567"`.
pub fn clean_phone_number(phone_number: &str) -> String {
    phone_number.chars().filter(|c| c.is_ascii_digit()).collect()
}
