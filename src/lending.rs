//! Borrow and return of library books.
//!
//! Per borrower and book the ledger moves `NoBorrow -> Borrowed -> Returned`,
//! where "borrowed" means a record with no `return_date`. A later borrow opens
//! a fresh record; history is never rewritten. The ledger write and the
//! inventory adjustment of each operation share one store transaction, so
//! `available_copies` never drifts from the open records and never goes
//! below zero.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::{
    cache::{EntityCache, book_key},
    errors::{AppError, AppResult},
    models::{LendingRequest, NewBorrow, StatusResponse, UserType},
    store::{DecrementOutcome, IncrementOutcome, InsertOutcome, LibraryStore},
};

pub const BORROWED: &str = "Book borrowed";
pub const RETURNED: &str = "Book returned";

#[derive(Clone)]
pub struct LendingEngine {
    store: Arc<dyn LibraryStore>,
    cache: EntityCache,
}

impl LendingEngine {
    #[must_use]
    pub fn new(store: Arc<dyn LibraryStore>, cache: EntityCache) -> Self {
        Self { store, cache }
    }

    /// Lend one copy of `book_id` to the borrower.
    ///
    /// # Errors
    /// `Validation` for an unknown `user_type`, `NotFound` for an unknown book,
    /// `Unavailable` when no copy is left, `Conflict` when the borrower already
    /// holds an open borrow of the book, `Database` when the store fails.
    pub async fn borrow(&self, req: &LendingRequest) -> AppResult<StatusResponse> {
        let user_type: UserType = req.user_type.parse()?;

        let book = self
            .store
            .get_book(req.book_id)
            .await?
            .ok_or_else(|| AppError::not_found("book not found"))?;
        if book.available_copies <= 0 {
            return Err(AppError::Unavailable("book not available".into()));
        }

        let borrow = NewBorrow {
            user_id: req.user_id,
            user_type,
            book_id: req.book_id,
            borrow_date: today(),
        };

        let mut tx = self.store.begin().await?;
        match tx.insert_open_borrow(&borrow).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::DuplicateOpenBorrow => {
                return Err(AppError::Conflict(
                    "book already borrowed by this user".into(),
                ));
            }
        }
        // The availability check above can race; this conditional update cannot.
        match tx.decrement_availability(req.book_id).await? {
            DecrementOutcome::Decremented => {}
            DecrementOutcome::AlreadyZero => {
                return Err(AppError::Unavailable("book not available".into()));
            }
            DecrementOutcome::NotFound => return Err(AppError::not_found("book not found")),
        }
        tx.commit().await?;

        self.cache.invalidate(&book_key(req.book_id)).await;
        info!(
            user_id = req.user_id,
            user_type = %user_type,
            book_id = req.book_id,
            "book borrowed"
        );
        Ok(StatusResponse::new(BORROWED))
    }

    /// Close the borrower's open borrow of `book_id` and put the copy back.
    ///
    /// # Errors
    /// `Validation` for an unknown `user_type`, `NotFound` when there is no
    /// open borrow (or the book no longer exists), `Database` when the store fails.
    pub async fn return_book(&self, req: &LendingRequest) -> AppResult<StatusResponse> {
        let user_type: UserType = req.user_type.parse()?;

        let mut tx = self.store.begin().await?;
        let closed = tx
            .close_open_borrow(req.user_id, user_type, req.book_id, today())
            .await?;
        if closed == 0 {
            return Err(AppError::not_found(
                "no active borrow for this user and book",
            ));
        }
        match tx.increment_availability(req.book_id).await? {
            IncrementOutcome::Incremented => {}
            IncrementOutcome::NotFound => return Err(AppError::not_found("book not found")),
        }
        tx.commit().await?;

        self.cache.invalidate(&book_key(req.book_id)).await;
        info!(
            user_id = req.user_id,
            user_type = %user_type,
            book_id = req.book_id,
            "book returned"
        );
        Ok(StatusResponse::new(RETURNED))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
