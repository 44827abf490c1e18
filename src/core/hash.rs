//! 文件内容哈希 - BLAKE3 快速哈希

/// 计算文件内容的 hash（使用 BLAKE3 快速哈希）
pub fn calculate_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    // 只取前 16 字节（32 个十六进制字符），足够检测变化
    hash.to_hex()[..32].to_string()
}

/// 快速计算文件 hash（基于采样，适用于大文件）
pub fn calculate_quick_hash(data: &[u8]) -> String {
    let len = data.len();
    if len <= 65536 {
        // 小于 64KB，完整哈希
        return calculate_hash(data);
    }

    // 大文件：采样哈希（头部 + 中部 + 尾部 + 大小）
    let mut hasher = blake3::Hasher::new();
    let chunk_size = 16384; // 16KB

    hasher.update(&data[..chunk_size]);
    hasher.update(&data[len / 2 - chunk_size / 2..len / 2 + chunk_size / 2]);
    hasher.update(&data[len - chunk_size..]);
    hasher.update(&len.to_le_bytes());

    let hash = hasher.finalize();
    hash.to_hex()[..32].to_string()
}
