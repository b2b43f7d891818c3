//! 服务配置

use chrono::FixedOffset;
use reward_config::LedgerConfig;

use crate::domain::BusinessCalendar;
use crate::error::{LedgerError, LedgerResult};

/// 账本运行参数
#[derive(Debug, Clone, Copy)]
pub struct LedgerSettings {
    pub enforce_store_scope: bool,
    pub calendar: BusinessCalendar,
    pub case_list_limit: u32,
}

impl LedgerSettings {
    pub fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        Ok(Self {
            enforce_store_scope: config.enforce_store_scope,
            calendar: BusinessCalendar::new(parse_utc_offset(&config.utc_offset)?),
            case_list_limit: config.case_list_limit.max(1),
        })
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            enforce_store_scope: true,
            calendar: BusinessCalendar::utc(),
            case_list_limit: 20,
        }
    }
}

/// 解析 `+07:00` / `-0530` / `Z` 形式的时区偏移
pub fn parse_utc_offset(raw: &str) -> LedgerResult<FixedOffset> {
    let invalid = || LedgerError::invalid_input(format!("Invalid utc_offset: {}", raw));
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match raw.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !(digits.len() == 2 || digits.len() == 4) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = if digits.len() == 4 {
        digits[2..].parse().map_err(|_| invalid())?
    } else {
        0
    };
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+07:00").unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_utc_offset("+08").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("07:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("+7:0").is_err());
        assert!(parse_utc_offset("").is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = LedgerSettings::from_config(&LedgerConfig::default()).unwrap();
        assert!(settings.enforce_store_scope);
        assert_eq!(settings.calendar.offset_seconds(), 7 * 3600);
        assert_eq!(settings.case_list_limit, 20);

        let config = LedgerConfig {
            utc_offset: "nowhere".into(),
            ..LedgerConfig::default()
        };
        assert!(LedgerSettings::from_config(&config).is_err());
    }
}
