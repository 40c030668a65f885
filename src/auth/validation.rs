//! Field rules shared by the service layer and every `UserStore` implementation.

use lazy_static::lazy_static;
use regex::Regex;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, UpdateProfileRequest},
        repo_types::{NewUser, ProfileChanges},
    },
    error::FieldError,
};

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[1-9]\d{0,15}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A registration that passed every field rule; the password is still plaintext.
#[derive(Debug)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
}

impl Registration {
    pub fn into_new_user(self, password_hash: String) -> NewUser {
        NewUser {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password_hash,
            phone: self.phone,
            date_of_birth: self.date_of_birth,
        }
    }
}

#[derive(Default)]
struct Errors(Vec<FieldError>);

impl Errors {
    fn check(&mut self, result: Result<(), FieldError>) {
        if let Err(e) = result {
            self.0.push(e);
        }
    }

    fn finish<T>(self, value: T) -> Result<T, Vec<FieldError>> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self.0)
        }
    }
}

pub fn check_name(field: &'static str, label: &str, value: &str) -> Result<(), FieldError> {
    let len = value.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(FieldError::new(
            field,
            format!("{label} must be between {NAME_MIN} and {NAME_MAX} characters"),
        ));
    }
    Ok(())
}

pub fn check_email(value: &str) -> Result<(), FieldError> {
    if value.is_empty() || value.len() > EMAIL_MAX || !is_valid_email(value) {
        return Err(FieldError::new("email", "Please provide a valid email"));
    }
    Ok(())
}

pub fn check_password(value: &str) -> Result<(), FieldError> {
    let len = value.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        return Err(FieldError::new(
            "password",
            format!("Password must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"),
        ));
    }
    let lower = value.chars().any(|c| c.is_lowercase());
    let upper = value.chars().any(|c| c.is_uppercase());
    let digit = value.chars().any(|c| c.is_ascii_digit());
    if !(lower && upper && digit) {
        return Err(FieldError::new(
            "password",
            "Password must contain at least one lowercase letter, one uppercase letter, and one number",
        ));
    }
    Ok(())
}

pub fn check_phone(value: &str) -> Result<(), FieldError> {
    if !PHONE_RE.is_match(value) {
        return Err(FieldError::new("phone", "Please provide a valid phone number"));
    }
    Ok(())
}

pub fn check_date_of_birth(value: Date, today: Date) -> Result<(), FieldError> {
    if value >= today {
        return Err(FieldError::new(
            "dateOfBirth",
            "Date of birth must be in the past",
        ));
    }
    Ok(())
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (its date part is kept).
pub fn parse_date(raw: &str) -> Result<Date, FieldError> {
    let raw = raw.trim();
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339).map(|dt| dt.date()))
        .map_err(|_| FieldError::new("dateOfBirth", "Please provide a valid date"))
}

/// Blank phone or date input means "not given"; forms send `""` for an untouched field.
fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn optional_date(errors: &mut Errors, raw: Option<String>, today: Date) -> Option<Date> {
    let raw = optional_text(raw)?;
    match parse_date(&raw) {
        Ok(d) => {
            errors.check(check_date_of_birth(d, today));
            Some(d)
        }
        Err(e) => {
            errors.check(Err(e));
            None
        }
    }
}

pub fn registration(req: RegisterRequest, today: Date) -> Result<Registration, Vec<FieldError>> {
    let mut errors = Errors::default();

    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    let email = normalize_email(&req.email);
    let phone = optional_text(req.phone);

    errors.check(check_name("firstName", "First name", &first_name));
    errors.check(check_name("lastName", "Last name", &last_name));
    errors.check(check_email(&email));
    errors.check(check_password(&req.password));
    if let Some(p) = &phone {
        errors.check(check_phone(p));
    }
    let date_of_birth = optional_date(&mut errors, req.date_of_birth, today);

    errors.finish(Registration {
        first_name,
        last_name,
        email,
        password: req.password,
        phone,
        date_of_birth,
    })
}

pub fn login(req: LoginRequest) -> Result<LoginRequest, Vec<FieldError>> {
    let mut errors = Errors::default();
    let email = normalize_email(&req.email);
    errors.check(check_email(&email));
    if req.password.is_empty() {
        errors.check(Err(FieldError::new("password", "Password is required")));
    }
    errors.finish(LoginRequest {
        email,
        password: req.password,
    })
}

/// Drops absent values, then validates what is left. A present name is checked
/// even when blank; blank phone and date count as absent.
pub fn profile_changes(
    req: UpdateProfileRequest,
    today: Date,
) -> Result<ProfileChanges, Vec<FieldError>> {
    let mut errors = Errors::default();

    let first_name = req.first_name.map(|v| v.trim().to_string());
    let last_name = req.last_name.map(|v| v.trim().to_string());
    let phone = optional_text(req.phone);
    if let Some(v) = &first_name {
        errors.check(check_name("firstName", "First name", v));
    }
    if let Some(v) = &last_name {
        errors.check(check_name("lastName", "Last name", v));
    }
    if let Some(v) = &phone {
        errors.check(check_phone(v));
    }
    let date_of_birth = optional_date(&mut errors, req.date_of_birth, today);

    errors.finish(ProfileChanges {
        first_name,
        last_name,
        phone,
        date_of_birth,
    })
}

/// Store-side re-check of a row about to be inserted.
pub fn check_new_user(user: &NewUser, today: Date) -> Result<(), Vec<FieldError>> {
    let mut errors = Errors::default();
    errors.check(check_name("firstName", "First name", &user.first_name));
    errors.check(check_name("lastName", "Last name", &user.last_name));
    errors.check(check_email(&user.email));
    if user.email != normalize_email(&user.email) {
        errors.check(Err(FieldError::new("email", "Email must be normalised")));
    }
    if user.password_hash.is_empty() {
        errors.check(Err(FieldError::new("password", "Password hash is missing")));
    }
    if let Some(p) = &user.phone {
        errors.check(check_phone(p));
    }
    if let Some(d) = user.date_of_birth {
        errors.check(check_date_of_birth(d, today));
    }
    errors.finish(())
}

/// Store-side re-check of a profile update.
pub fn check_changes(changes: &ProfileChanges, today: Date) -> Result<(), Vec<FieldError>> {
    let mut errors = Errors::default();
    if let Some(v) = &changes.first_name {
        errors.check(check_name("firstName", "First name", v));
    }
    if let Some(v) = &changes.last_name {
        errors.check(check_name("lastName", "Last name", v));
    }
    if let Some(v) = &changes.phone {
        errors.check(check_phone(v));
    }
    if let Some(d) = changes.date_of_birth {
        errors.check(check_date_of_birth(d, today));
    }
    errors.finish(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const TODAY: Date = date!(2025 - 06 - 15);

    fn register(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: email.into(),
            password: password.into(),
            phone: None,
            date_of_birth: None,
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.field).collect()
    }

    #[test]
    fn accepts_minimal_registration_and_normalises_email() {
        let reg = registration(register("  Ann@X.com ", "Abcdef1"), TODAY).expect("valid");
        assert_eq!(reg.email, "ann@x.com");
        assert!(reg.phone.is_none());
    }

    #[test]
    fn collects_every_failing_field() {
        let req = RegisterRequest {
            first_name: "A".into(),
            last_name: "".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            phone: Some("012345".into()),
            date_of_birth: Some("2030-01-01".into()),
        };
        let errs = registration(req, TODAY).unwrap_err();
        assert_eq!(
            fields(&errs),
            vec!["firstName", "lastName", "email", "password", "phone", "dateOfBirth"]
        );
    }

    #[test]
    fn password_needs_mixed_case_and_digit() {
        assert!(check_password("abcdef1").is_err());
        assert!(check_password("ABCDEF1").is_err());
        assert!(check_password("Abcdefg").is_err());
        assert!(check_password("Abcdef1").is_ok());
    }

    #[test]
    fn phone_pattern() {
        assert!(check_phone("+4915112345678").is_ok());
        assert!(check_phone("5551234").is_ok());
        assert!(check_phone("0551234").is_err());
        assert!(check_phone("+1-555-1234").is_err());
        assert!(check_phone("12345678901234567").is_err());
    }

    #[test]
    fn date_of_birth_must_be_past() {
        assert!(check_date_of_birth(date!(2025 - 06 - 14), TODAY).is_ok());
        assert!(check_date_of_birth(TODAY, TODAY).is_err());
        assert_eq!(parse_date("1990-05-01").unwrap(), date!(1990 - 05 - 01));
        assert_eq!(
            parse_date("1990-05-01T10:00:00Z").unwrap(),
            date!(1990 - 05 - 01)
        );
        assert!(parse_date("01/05/1990").is_err());
    }

    #[test]
    fn profile_changes_drop_blank_phone_and_date() {
        let req = UpdateProfileRequest {
            first_name: None,
            last_name: None,
            phone: Some("".into()),
            date_of_birth: Some("  ".into()),
        };
        let changes = profile_changes(req, TODAY).expect("valid");
        assert!(changes.is_empty());
    }

    #[test]
    fn profile_changes_reject_blank_names() {
        let req = UpdateProfileRequest {
            first_name: Some("".into()),
            last_name: Some("   ".into()),
            phone: None,
            date_of_birth: None,
        };
        let errs = profile_changes(req, TODAY).unwrap_err();
        assert_eq!(fields(&errs), vec!["firstName", "lastName"]);
    }

    #[test]
    fn profile_changes_validate_present_fields() {
        let req = UpdateProfileRequest {
            first_name: Some("B".into()),
            last_name: Some("Stone".into()),
            phone: None,
            date_of_birth: Some("2099-01-01".into()),
        };
        let errs = profile_changes(req, TODAY).unwrap_err();
        assert_eq!(fields(&errs), vec!["firstName", "dateOfBirth"]);
    }

    #[test]
    fn store_check_rejects_unnormalised_email() {
        let user = NewUser {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "Ann@X.com".into(),
            password_hash: "hash".into(),
            phone: None,
            date_of_birth: None,
        };
        let errs = check_new_user(&user, TODAY).unwrap_err();
        assert_eq!(fields(&errs), vec!["email"]);
    }

    #[test]
    fn login_requires_password() {
        let errs = login(LoginRequest {
            email: "a@x.com".into(),
            password: String::new(),
        })
        .unwrap_err();
        assert_eq!(fields(&errs), vec!["password"]);
    }
}
