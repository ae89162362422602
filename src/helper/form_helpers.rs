use crate::helper::sanitization_helpers::strip_all_html;
use crate::models::db_operations::posts_db_operations::PostInput;
use crate::models::db_operations::users_db_operations::{self, ProfileInput};
use crate::models::db_operations::{taxonomy_db_operations, DbError};
use crate::models::{Category, Location, Post, User};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

pub const TITLE_MAX_LEN: usize = 256;
pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;
const DATETIME_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Per-field validation messages, rendered next to the offending inputs.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn merge(&mut self, other: FormErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

fn field(fields: &HashMap<String, String>, name: &str) -> String {
    fields.get(name).cloned().unwrap_or_default()
}

/// HTML checkboxes are present when ticked and absent otherwise.
fn checkbox(fields: &HashMap<String, String>, name: &str) -> bool {
    fields
        .get(name)
        .map_or(false, |v| matches!(v.as_str(), "on" | "true" | "1" | "yes"))
}

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.@+-]+$").unwrap())
}

fn slug_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap())
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && username.chars().count() <= USERNAME_MAX_LEN && username_regex().is_match(username)
}

pub fn is_valid_slug(slug: &str) -> bool {
    slug_regex().is_match(slug)
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Value of an `<input type="datetime-local">`, read as UTC. Seconds are optional.
pub fn parse_datetime_local(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_LOCAL_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_datetime_local(value: DateTime<Utc>) -> String {
    value.format(DATETIME_LOCAL_FORMAT).to_string()
}

fn parse_optional_id(raw: &str) -> Result<Option<i64>, ()> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<i64>().map(Some).map_err(|_| ())
}

/// Raw post form values, kept as strings so a rejected form re-renders as typed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PostFormValues {
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub location: String,
    pub category: String,
    pub is_published: bool,
}

impl PostFormValues {
    pub fn blank(now: DateTime<Utc>) -> Self {
        PostFormValues {
            title: String::new(),
            text: String::new(),
            pub_date: format_datetime_local(now),
            location: String::new(),
            category: String::new(),
            is_published: true,
        }
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        PostFormValues {
            title: field(fields, "title"),
            text: field(fields, "text"),
            pub_date: field(fields, "pub_date"),
            location: field(fields, "location"),
            category: field(fields, "category"),
            is_published: checkbox(fields, "is_published"),
        }
    }

    pub fn from_post(post: &Post) -> Self {
        PostFormValues {
            title: post.title.clone(),
            text: post.text.clone(),
            pub_date: format_datetime_local(post.pub_date),
            location: post.location_id.map(|id| id.to_string()).unwrap_or_default(),
            category: post.category_id.map(|id| id.to_string()).unwrap_or_default(),
            is_published: post.is_published,
        }
    }

    /// Category and location must name existing rows; an empty date means now.
    pub fn validate(
        &self,
        categories: &[Category],
        locations: &[Location],
        now: DateTime<Utc>,
    ) -> Result<PostInput, FormErrors> {
        let mut errors = FormErrors::default();

        let title = strip_all_html(&self.title);
        if title.is_empty() {
            errors.add("title", "This field is required.");
        } else if title.chars().count() > TITLE_MAX_LEN {
            errors.add("title", format!("Ensure this value has at most {} characters.", TITLE_MAX_LEN));
        }

        let text = self.text.trim().to_string();
        if text.is_empty() {
            errors.add("text", "This field is required.");
        }

        let pub_date = if self.pub_date.trim().is_empty() {
            now
        } else {
            match parse_datetime_local(&self.pub_date) {
                Some(date) => date,
                None => {
                    errors.add("pub_date", "Enter a valid date/time.");
                    now
                }
            }
        };

        let category_id = match parse_optional_id(&self.category) {
            Ok(Some(id)) if categories.iter().any(|c| c.id == id) => Some(id),
            Ok(None) => {
                errors.add("category", "This field is required.");
                None
            }
            _ => {
                errors.add("category", "Select a valid choice.");
                None
            }
        };

        let location_id = match parse_optional_id(&self.location) {
            Ok(None) => None,
            Ok(Some(id)) if locations.iter().any(|l| l.id == id) => Some(id),
            _ => {
                errors.add("location", "Select a valid choice.");
                None
            }
        };

        errors.into_result(PostInput {
            title,
            text,
            pub_date,
            is_published: self.is_published,
            location_id,
            category_id,
        })
    }
}

/// Comment body; surrounding whitespace is not content.
pub fn validate_comment_text(raw: &str) -> Result<String, FormErrors> {
    let text = raw.trim();
    let mut errors = FormErrors::default();
    if text.is_empty() {
        errors.add("text", "This field is required.");
    }
    errors.into_result(text.to_string())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileFormValues {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: String,
}

impl ProfileFormValues {
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        ProfileFormValues {
            username: field(fields, "username"),
            first_name: field(fields, "first_name"),
            last_name: field(fields, "last_name"),
            email: field(fields, "email"),
            bio: field(fields, "bio"),
        }
    }

    pub fn from_user(user: &User) -> Self {
        ProfileFormValues {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            bio: user.bio.clone().unwrap_or_default(),
        }
    }

    /// Checks field rules and that the new username is free for `user_id`.
    pub fn validate(&self, conn: &Connection, user_id: i64) -> Result<Result<ProfileInput, FormErrors>, DbError> {
        let mut errors = FormErrors::default();

        let username = self.username.trim().to_string();
        if username.is_empty() {
            errors.add("username", "This field is required.");
        } else if !is_valid_username(&username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if users_db_operations::username_taken(conn, &username, Some(user_id))? {
            errors.add("username", "A user with that username already exists.");
        }

        let email = self.email.trim().to_string();
        if !email.is_empty() && !is_valid_email(&email) {
            errors.add("email", "Enter a valid email address.");
        }

        let first_name = strip_all_html(&self.first_name);
        let last_name = strip_all_html(&self.last_name);
        for (name, value) in [("first_name", &first_name), ("last_name", &last_name)] {
            if value.chars().count() > USERNAME_MAX_LEN {
                errors.add(name, format!("Ensure this value has at most {} characters.", USERNAME_MAX_LEN));
            }
        }

        let bio = self.bio.trim();
        Ok(errors.into_result(ProfileInput {
            username,
            first_name,
            last_name,
            email,
            bio: (!bio.is_empty()).then(|| bio.to_string()),
        }))
    }
}

/// Sign-up form. Passwords are never echoed back.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegistrationFormValues {
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password1: String,
    #[serde(skip)]
    pub password2: String,
}

impl RegistrationFormValues {
    pub fn validate(&self, conn: &Connection) -> Result<Result<(), FormErrors>, DbError> {
        let mut errors = FormErrors::default();

        if self.username.is_empty() {
            errors.add("username", "This field is required.");
        } else if !is_valid_username(&self.username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if users_db_operations::username_taken(conn, &self.username, None)? {
            errors.add("username", "A user with that username already exists.");
        }

        if !self.email.is_empty() && !is_valid_email(&self.email) {
            errors.add("email", "Enter a valid email address.");
        }

        errors.merge(password_errors(&self.password1, &self.password2));
        Ok(errors.into_result(()))
    }
}

/// Confirmation must match; short or all-digit passwords are refused.
pub fn password_errors(password1: &str, password2: &str) -> FormErrors {
    let mut errors = FormErrors::default();
    if password1.is_empty() {
        errors.add("password1", "This field is required.");
        return errors;
    }
    if password1 != password2 {
        errors.add("password2", "The two password fields didn't match.");
    }
    if password1.chars().count() < PASSWORD_MIN_LEN {
        errors.add(
            "password1",
            format!("This password is too short. It must contain at least {} characters.", PASSWORD_MIN_LEN),
        );
    }
    if password1.chars().all(|c| c.is_ascii_digit()) {
        errors.add("password1", "This password is entirely numeric.");
    }
    errors
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryFormValues {
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
}

/// Cleaned category fields, ready for the database.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInput {
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
}

impl CategoryFormValues {
    pub fn blank() -> Self {
        CategoryFormValues {
            title: String::new(),
            description: String::new(),
            slug: String::new(),
            is_published: true,
        }
    }

    pub fn from_category(category: &Category) -> Self {
        CategoryFormValues {
            title: category.title.clone(),
            description: category.description.clone(),
            slug: category.slug.clone(),
            is_published: category.is_published,
        }
    }

    /// `category_id` is the row being edited, if any; its own slug is not a clash.
    pub fn validate(
        &self,
        conn: &Connection,
        category_id: Option<i64>,
    ) -> Result<Result<CategoryInput, FormErrors>, DbError> {
        let mut errors = FormErrors::default();

        let title = strip_all_html(&self.title);
        if title.is_empty() {
            errors.add("title", "This field is required.");
        } else if title.chars().count() > TITLE_MAX_LEN {
            errors.add("title", format!("Ensure this value has at most {} characters.", TITLE_MAX_LEN));
        }

        let description = self.description.trim().to_string();
        if description.is_empty() {
            errors.add("description", "This field is required.");
        }

        if self.slug.is_empty() {
            errors.add("slug", "This field is required.");
        } else if !is_valid_slug(&self.slug) {
            errors.add(
                "slug",
                "Enter a valid slug consisting of Latin letters, numbers, underscores or hyphens.",
            );
        } else if taxonomy_db_operations::slug_taken(conn, &self.slug, category_id)? {
            errors.add("slug", "Category with this slug already exists.");
        }

        Ok(errors.into_result(CategoryInput {
            title,
            description,
            slug: self.slug.clone(),
            is_published: self.is_published,
        }))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationFormValues {
    pub name: String,
    pub is_published: bool,
}

impl LocationFormValues {
    pub fn blank() -> Self {
        LocationFormValues { name: String::new(), is_published: true }
    }

    pub fn from_location(location: &Location) -> Self {
        LocationFormValues { name: location.name.clone(), is_published: location.is_published }
    }

    /// Returns the cleaned name.
    pub fn validate(
        &self,
        conn: &Connection,
        location_id: Option<i64>,
    ) -> Result<Result<String, FormErrors>, DbError> {
        let mut errors = FormErrors::default();
        let name = strip_all_html(&self.name);
        if name.is_empty() {
            errors.add("name", "This field is required.");
        } else if name.chars().count() > TITLE_MAX_LEN {
            errors.add("name", format!("Ensure this value has at most {} characters.", TITLE_MAX_LEN));
        } else if taxonomy_db_operations::location_name_taken(conn, &name, location_id)? {
            errors.add("name", "Location with this name already exists.");
        }
        Ok(errors.into_result(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::test_support::{memory_db, seed_user};
    use chrono::{Duration, TimeZone};

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn category(id: i64) -> Category {
        Category {
            id,
            title: "Travel".into(),
            description: "Trips".into(),
            slug: "travel".into(),
            is_published: true,
            created_at: Utc::now(),
        }
    }

    fn location(id: i64) -> Location {
        Location { id, name: "Moscow".into(), is_published: true, created_at: Utc::now() }
    }

    #[test]
    fn datetime_local_round_trips_as_utc() {
        let parsed = parse_datetime_local("2024-03-01T10:30").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap());
        assert_eq!(format_datetime_local(parsed), "2024-03-01T10:30");
        assert!(parse_datetime_local("2024-03-01T10:30:15").is_some());
        assert!(parse_datetime_local("yesterday").is_none());
    }

    #[test]
    fn valid_post_form_produces_input() {
        let now = Utc::now();
        let values = PostFormValues::from_fields(&fields(&[
            ("title", "<b>Hello</b>"),
            ("text", " Body "),
            ("pub_date", "2030-01-01T00:00"),
            ("category", "1"),
            ("location", ""),
            ("is_published", "on"),
        ]));
        let input = values.validate(&[category(1)], &[location(2)], now).unwrap();
        assert_eq!(input.title, "Hello");
        assert_eq!(input.text, "Body");
        assert_eq!(input.category_id, Some(1));
        assert_eq!(input.location_id, None);
        assert!(input.is_published);
        assert!(input.pub_date > now);
    }

    #[test]
    fn post_form_defaults_pub_date_and_flags_bad_choices() {
        let now = Utc::now();
        let values = PostFormValues::from_fields(&fields(&[
            ("title", "T"),
            ("text", "x"),
            ("category", "7"),
            ("location", "nope"),
        ]));
        let errors = values.validate(&[category(1)], &[location(2)], now).unwrap_err();
        assert!(errors.has("category"));
        assert!(errors.has("location"));
        assert!(!errors.has("pub_date"));

        let ok = PostFormValues::from_fields(&fields(&[("title", "T"), ("text", "x"), ("category", "1")]))
            .validate(&[category(1)], &[], now)
            .unwrap();
        assert_eq!(ok.pub_date, now);
        assert!(!ok.is_published);
    }

    #[test]
    fn post_form_requires_title_text_and_category() {
        let errors = PostFormValues::blank(Utc::now()).validate(&[], &[], Utc::now()).unwrap_err();
        assert!(errors.has("title"));
        assert!(errors.has("text"));
        assert!(errors.has("category"));

        let long = "x".repeat(TITLE_MAX_LEN + 1);
        let values = PostFormValues { title: long, ..PostFormValues::blank(Utc::now() - Duration::days(1)) };
        assert!(values.validate(&[], &[], Utc::now()).unwrap_err().has("title"));
    }

    #[test]
    fn comment_text_must_not_be_blank() {
        assert_eq!(validate_comment_text("  nice  ").unwrap(), "nice");
        assert!(validate_comment_text("   ").unwrap_err().has("text"));
    }

    #[test]
    fn password_rules() {
        assert!(password_errors("correct-horse", "correct-horse").is_empty());
        assert!(password_errors("correct-horse", "other-horse").has("password2"));
        assert!(password_errors("short", "short").has("password1"));
        assert!(password_errors("1234567890", "1234567890").has("password1"));
    }

    #[test]
    fn registration_rejects_taken_username() {
        let conn = memory_db();
        seed_user(&conn, "alice");
        let values = RegistrationFormValues {
            username: "alice".into(),
            email: String::new(),
            password1: "long-enough-pw".into(),
            password2: "long-enough-pw".into(),
        };
        assert!(values.validate(&conn).unwrap().unwrap_err().has("username"));

        let fresh = RegistrationFormValues { username: "bob".into(), ..values };
        assert!(fresh.validate(&conn).unwrap().is_ok());
    }

    #[test]
    fn profile_form_allows_keeping_own_username() {
        let conn = memory_db();
        let alice = seed_user(&conn, "alice");
        seed_user(&conn, "bob");

        let mut values = ProfileFormValues::from_fields(&fields(&[
            ("username", "alice"),
            ("first_name", "Alice"),
            ("email", "alice@example.com"),
            ("bio", "   "),
        ]));
        let input = values.validate(&conn, alice).unwrap().unwrap();
        assert_eq!(input.bio, None);
        assert_eq!(input.first_name, "Alice");

        values.username = "bob".into();
        assert!(values.validate(&conn, alice).unwrap().unwrap_err().has("username"));

        values.username = "no spaces".into();
        values.email = "not-an-email".into();
        let errors = values.validate(&conn, alice).unwrap().unwrap_err();
        assert!(errors.has("username") && errors.has("email"));
    }

    #[test]
    fn profile_names_are_limited_to_150_characters() {
        let conn = memory_db();
        let alice = seed_user(&conn, "alice");
        let mut values = ProfileFormValues::from_fields(&fields(&[("username", "alice")]));

        values.first_name = "a".repeat(USERNAME_MAX_LEN + 1);
        values.last_name = "b".repeat(USERNAME_MAX_LEN + 1);
        let errors = values.validate(&conn, alice).unwrap().unwrap_err();
        assert!(errors.has("first_name") && errors.has("last_name"));
        assert!(!errors.has("username"));

        values.first_name = "a".repeat(USERNAME_MAX_LEN);
        values.last_name = String::new();
        let input = values.validate(&conn, alice).unwrap().unwrap();
        assert_eq!(input.first_name.chars().count(), USERNAME_MAX_LEN);
    }

    #[test]
    fn category_slug_rules() {
        let conn = memory_db();
        let id = taxonomy_db_operations::create_category(&conn, "Travel", "Trips", "travel", true).unwrap();

        let mut values = CategoryFormValues {
            title: "Travel".into(),
            description: "Trips".into(),
            slug: "travel".into(),
            is_published: false,
        };
        assert!(values.validate(&conn, None).unwrap().unwrap_err().has("slug"));
        assert!(values.validate(&conn, Some(id)).unwrap().is_ok());

        values.slug = "bad slug!".into();
        assert!(values.validate(&conn, None).unwrap().unwrap_err().has("slug"));
    }

    #[test]
    fn location_name_must_be_unique() {
        let conn = memory_db();
        taxonomy_db_operations::create_location(&conn, "Moscow", true).unwrap();
        let values = LocationFormValues { name: "Moscow".into(), ..LocationFormValues::blank() };
        assert!(values.validate(&conn, None).unwrap().unwrap_err().has("name"));
        let other = LocationFormValues { name: "Kazan".into(), ..values };
        assert_eq!(other.validate(&conn, None).unwrap().unwrap(), "Kazan");
    }
}
