//! Persistence seam for the service.
//!
//! [`LibraryStore`] covers single-statement reads and writes. The two-step
//! borrow and return mutations go through a [`LendingTx`] obtained from
//! [`LibraryStore::begin`], which is rolled back unless committed.

mod postgres;

pub use postgres::{PgStore, connect_pool};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    errors::AppResult,
    models::{
        Book, BorrowRecord, CreateBookRequest, Lecturer, LecturerRequest, NewBorrow, Student,
        StudentRequest, UserType,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    Decremented,
    NotFound,
    AlreadyZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    Incremented,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateOpenBorrow,
}

#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn get_book(&self, book_id: i64) -> AppResult<Option<Book>>;
    async fn list_books(&self) -> AppResult<Vec<Book>>;
    async fn create_book(&self, book: &CreateBookRequest) -> AppResult<Book>;
    /// Every ledger row for the book, oldest first.
    async fn borrow_history(&self, book_id: i64) -> AppResult<Vec<BorrowRecord>>;

    async fn create_student(&self, student: &StudentRequest) -> AppResult<Student>;
    async fn get_student(&self, id: i64) -> AppResult<Option<Student>>;
    async fn update_student(&self, id: i64, student: &StudentRequest)
    -> AppResult<Option<Student>>;
    async fn delete_student(&self, id: i64) -> AppResult<bool>;

    async fn create_lecturer(&self, lecturer: &LecturerRequest) -> AppResult<Lecturer>;
    async fn get_lecturer(&self, id: i64) -> AppResult<Option<Lecturer>>;
    async fn update_lecturer(
        &self,
        id: i64,
        lecturer: &LecturerRequest,
    ) -> AppResult<Option<Lecturer>>;
    async fn delete_lecturer(&self, id: i64) -> AppResult<bool>;

    /// Open a unit of work for a borrow or return.
    async fn begin(&self) -> AppResult<Box<dyn LendingTx>>;
}

/// A single store transaction. Dropping it without [`LendingTx::commit`]
/// discards every mutation made through it.
#[async_trait]
pub trait LendingTx: Send {
    /// Take one copy, only if at least one is available.
    async fn decrement_availability(&mut self, book_id: i64) -> AppResult<DecrementOutcome>;
    async fn increment_availability(&mut self, book_id: i64) -> AppResult<IncrementOutcome>;
    async fn insert_open_borrow(&mut self, borrow: &NewBorrow) -> AppResult<InsertOutcome>;
    /// Set `return_date` on the borrower's open record; returns rows affected.
    async fn close_open_borrow(
        &mut self,
        user_id: i64,
        user_type: UserType,
        book_id: i64,
        return_date: NaiveDate,
    ) -> AppResult<u64>;
    async fn commit(self: Box<Self>) -> AppResult<()>;
}
