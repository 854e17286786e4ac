//! Synchronous form checks surfaced to callers before any gateway request.

use crate::error::{ApiError, ApiResult};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MIN_NICKNAME_LEN: usize = 3;
pub const MAX_NICKNAME_LEN: usize = 20;
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

pub fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::validation(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::validation(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation(
            "Password must contain at least one number",
        ));
    }
    Ok(())
}

/// Returns the trimmed nickname on success.
pub fn validate_nickname(nickname: &str) -> ApiResult<String> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Nickname must not be empty"));
    }
    let len = trimmed.chars().count();
    if len < MIN_NICKNAME_LEN {
        return Err(ApiError::validation(format!(
            "Nickname must be at least {MIN_NICKNAME_LEN} characters"
        )));
    }
    if len > MAX_NICKNAME_LEN {
        return Err(ApiError::validation(format!(
            "Nickname must be at most {MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_server_name(name: &str) -> ApiResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Server name must not be empty"));
    }
    Ok(trimmed.to_string())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Indonesian mobile number: `+62`, `62` or `0` followed by 9-12 digits.
/// Spaces and hyphens are ignored.
pub fn is_phone_number(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let rest = compact
        .strip_prefix("+62")
        .or_else(|| compact.strip_prefix("62"))
        .or_else(|| compact.strip_prefix('0'));
    match rest {
        Some(digits) => {
            (9..=12).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

pub fn validate_job_contact(contact: &str) -> ApiResult<()> {
    if is_phone_number(contact) || is_email(contact) {
        Ok(())
    } else {
        Err(ApiError::validation(
            "Contact must be a valid WhatsApp number (08xxx) or e-mail address",
        ))
    }
}

/// Keeps the digits and regroups them with `.` thousands separators.
pub fn format_salary(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(char::is_ascii_digit).collect();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.iter().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(*digit);
    }
    formatted
}

pub fn validate_photo_upload(mime_type: &str, size_bytes: usize) -> ApiResult<()> {
    if !mime_type.starts_with("image/") {
        return Err(ApiError::validation("File must be an image"));
    }
    if size_bytes > MAX_PHOTO_BYTES {
        return Err(ApiError::validation("File size must be less than 5MB"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rules_report_first_failure() {
        assert_eq!(
            validate_password("Ab1").unwrap_err().message,
            "Password must be at least 8 characters"
        );
        assert_eq!(
            validate_password("abcdefg1").unwrap_err().message,
            "Password must contain at least one uppercase letter"
        );
        assert_eq!(
            validate_password("ABCDEFG1").unwrap_err().message,
            "Password must contain at least one lowercase letter"
        );
        assert_eq!(
            validate_password("Abcdefgh").unwrap_err().message,
            "Password must contain at least one number"
        );
        validate_password("Abcdefg1").expect("valid");
    }

    #[test]
    fn nickname_bounds() {
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname("ab").is_err());
        assert!(validate_nickname(&"x".repeat(21)).is_err());
        assert_eq!(validate_nickname("  budi  ").expect("ok"), "budi");
    }

    #[test]
    fn job_contact_accepts_phone_or_email() {
        validate_job_contact("0812-3456-789").expect("local phone");
        validate_job_contact("+62 812 3456 7890").expect("intl phone");
        validate_job_contact("hrd@kopikenangan.com").expect("email");
        assert!(validate_job_contact("0812").is_err());
        assert!(validate_job_contact("hrd@kopi").is_err());
        assert!(validate_job_contact("call me").is_err());
    }

    #[test]
    fn salary_gets_thousands_separators() {
        assert_eq!(format_salary("4500000"), "4.500.000");
        assert_eq!(format_salary("Rp 150000 / shift"), "150.000");
        assert_eq!(format_salary("999"), "999");
        assert_eq!(format_salary(""), "");
    }

    #[test]
    fn photo_upload_limits() {
        validate_photo_upload("image/png", 1024).expect("ok");
        assert!(validate_photo_upload("application/pdf", 10).is_err());
        assert!(validate_photo_upload("image/jpeg", MAX_PHOTO_BYTES + 1).is_err());
    }
}
