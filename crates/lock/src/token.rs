//! 所有权令牌
//!
//! 令牌优先级：显式指定的值 > 自定义生成函数 > 32 字节随机数的 base64 编码。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};

const TOKEN_BYTES: usize = 32;

/// 生成随机令牌
pub fn generate_token() -> std::result::Result<String, rand::rand_core::OsError> {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut buf)?;
    Ok(STANDARD.encode(buf))
}

/// 按配置决定本次加锁使用的令牌
pub(crate) fn resolve_token(config: &Config, key: &str) -> Result<String> {
    if let Some(value) = &config.value {
        return Ok(value.clone());
    }
    if let Some(gen_value) = &config.gen_value_func {
        return gen_value()
            .map_err(|err| Error::with_source(ErrorKind::GenerateTokenFailed, key, err));
    }
    generate_token().map_err(|err| Error::with_source(ErrorKind::GenerateTokenFailed, key, err))
}
