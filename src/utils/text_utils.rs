// String::truncate panics when cutting a multibyte char
// in half, so we look for the byte index of the nth char
// instead.
pub fn truncate_utf8(s: &mut String, max_chars: usize) {
  if let Some((idx, _)) = s.char_indices().nth(max_chars) {
    s.truncate(idx);
  }
}

// Trim, then cut at max_chars. Used on every text field
// coming from the outside world.
pub fn clean_field(value: &str, max_chars: usize) -> String {
  let mut cleaned = value.trim().to_string();
  truncate_utf8(&mut cleaned, max_chars);
  cleaned
}
