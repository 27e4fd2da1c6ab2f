use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::errors::AppError;

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub available_copies: i32,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub borrow_id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub user_type: UserType,
    pub book_id: i64,
    pub borrow_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
}

impl BorrowRecord {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub dept: String,
    pub year: i32,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lecturer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub dept: String,
    pub designation: String,
}

/// Kind of borrower. Student and lecturer ids live in separate tables, so a
/// borrower is identified by `(user_id, user_type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Student,
    Lecturer,
}

impl UserType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Student => "student",
            UserType::Lecturer => "lecturer",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("user_type must be \"student\" or \"lecturer\", got {0:?}")]
pub struct UnknownUserType(pub String);

impl FromStr for UserType {
    type Err = UnknownUserType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(UserType::Student),
            "lecturer" => Ok(UserType::Lecturer),
            other => Err(UnknownUserType(other.to_string())),
        }
    }
}

impl TryFrom<String> for UserType {
    type Error = UnknownUserType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnknownUserType> for AppError {
    fn from(err: UnknownUserType) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateBookRequest {
    /// Assigned by the store; accepted only so clients may echo a `Book` back.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub book_id: i64,
    #[validate(custom(function = "crate::validation::not_blank"))]
    pub title: String,
    #[validate(custom(function = "crate::validation::not_blank"))]
    pub author: String,
    #[validate(range(min = 1))]
    pub available_copies: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StudentRequest {
    #[validate(custom(function = "crate::validation::not_blank"))]
    pub name: String,
    #[validate(custom(function = "crate::validation::campus_email"))]
    pub email: String,
    #[validate(range(min = 1, max = 99))]
    pub age: i32,
    #[validate(custom(function = "crate::validation::not_empty"))]
    pub dept: String,
    #[validate(range(min = 1))]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LecturerRequest {
    #[validate(custom(function = "crate::validation::not_blank"))]
    pub name: String,
    #[validate(custom(function = "crate::validation::campus_email"))]
    pub email: String,
    #[validate(custom(function = "crate::validation::not_empty"))]
    pub dept: String,
    #[validate(custom(function = "crate::validation::not_empty"))]
    pub designation: String,
}

/// Body of `POST /borrow` and `POST /return`. `user_type` stays a string, and
/// decodes as `""` when absent, so a bad or missing value is reported by
/// `UserType` parsing rather than as a decode failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LendingRequest {
    pub user_id: i64,
    #[serde(default)]
    pub user_type: String,
    pub book_id: i64,
}

/// Ledger row about to be opened by a borrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBorrow {
    pub user_id: i64,
    pub user_type: UserType,
    pub book_id: i64,
    pub borrow_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}
