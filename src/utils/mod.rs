pub mod ip;

const CLICK_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// 点击 ID 最小长度
pub const MIN_CLICK_ID_LENGTH: usize = 16;

pub fn generate_random_code(length: usize) -> String {
    use std::iter;

    iter::repeat_with(|| CLICK_ID_ALPHABET[rand::random_range(0..CLICK_ID_ALPHABET.len())] as char)
        .take(length)
        .collect()
}

/// 生成点击 ID（长度不足 16 时按 16 处理）
pub fn generate_click_id(length: usize) -> String {
    generate_random_code(length.max(MIN_CLICK_ID_LENGTH))
}

/// 按字符数截断字符串（不会切断 UTF-8 字符）
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
