use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{
    PgPool, Postgres, Transaction,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::{info, warn};

use super::{DecrementOutcome, IncrementOutcome, InsertOutcome, LendingTx, LibraryStore};
use crate::{
    Config,
    errors::AppResult,
    models::{
        Book, BorrowRecord, CreateBookRequest, Lecturer, LecturerRequest, NewBorrow, Student,
        StudentRequest, UserType,
    },
};

/// Open the connection pool, retrying while the server comes up.
///
/// Every session gets a `statement_timeout` equal to the store timeout, which
/// also bounds how long a request waits for a pooled connection. Attempts
/// and backoff come from `config`.
///
/// # Errors
/// Returns the last connection error once `db_connect_attempts` is exhausted,
/// or immediately if `database_url` cannot be parsed.
pub async fn connect_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let timeout = config.store_timeout();
    let connect_options = PgConnectOptions::from_str(&config.database_url)?
        .options([("statement_timeout", format!("{}ms", timeout.as_millis()))]);
    let pool_options = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(timeout);
    let attempts = config.db_connect_attempts.max(1);

    let mut attempt = 1;
    loop {
        match pool_options
            .clone()
            .connect_with(connect_options.clone())
            .await
        {
            Ok(pool) => {
                info!(attempt, "connected to postgres");
                return Ok(pool);
            }
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                let delay = config.retry_delay(attempt);
                warn!(attempt, attempts, ?delay, error = %e, "postgres not reachable yet");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`LibraryStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryStore for PgStore {
    async fn get_book(&self, book_id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT book_id, title, author, available_copies FROM books WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT book_id, title, author, available_copies FROM books ORDER BY book_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn create_book(&self, book: &CreateBookRequest) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            "INSERT INTO books (title, author, available_copies) VALUES ($1, $2, $3)
             RETURNING book_id, title, author, available_copies",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.available_copies)
        .fetch_one(&self.pool)
        .await?;
        Ok(book)
    }

    async fn borrow_history(&self, book_id: i64) -> AppResult<Vec<BorrowRecord>> {
        let records = sqlx::query_as::<_, BorrowRecord>(
            "SELECT borrow_id, user_id, user_type, book_id, borrow_date, return_date
             FROM borrow_records WHERE book_id = $1 ORDER BY borrow_id",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn create_student(&self, student: &StudentRequest) -> AppResult<Student> {
        let student = sqlx::query_as::<_, Student>(
            "INSERT INTO students (name, email, age, dept, year) VALUES ($1, $2, $3, $4, $5)
             RETURNING id, name, email, age, dept, year",
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(student.age)
        .bind(&student.dept)
        .bind(student.year)
        .fetch_one(&self.pool)
        .await?;
        Ok(student)
    }

    async fn get_student(&self, id: i64) -> AppResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT id, name, email, age, dept, year FROM students WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    async fn update_student(
        &self,
        id: i64,
        student: &StudentRequest,
    ) -> AppResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(
            "UPDATE students SET name = $1, email = $2, age = $3, dept = $4, year = $5
             WHERE id = $6
             RETURNING id, name, email, age, dept, year",
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(student.age)
        .bind(&student.dept)
        .bind(student.year)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    async fn delete_student(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_lecturer(&self, lecturer: &LecturerRequest) -> AppResult<Lecturer> {
        let lecturer = sqlx::query_as::<_, Lecturer>(
            "INSERT INTO lecturers (name, email, dept, designation) VALUES ($1, $2, $3, $4)
             RETURNING id, name, email, dept, designation",
        )
        .bind(&lecturer.name)
        .bind(&lecturer.email)
        .bind(&lecturer.dept)
        .bind(&lecturer.designation)
        .fetch_one(&self.pool)
        .await?;
        Ok(lecturer)
    }

    async fn get_lecturer(&self, id: i64) -> AppResult<Option<Lecturer>> {
        let lecturer = sqlx::query_as::<_, Lecturer>(
            "SELECT id, name, email, dept, designation FROM lecturers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lecturer)
    }

    async fn update_lecturer(
        &self,
        id: i64,
        lecturer: &LecturerRequest,
    ) -> AppResult<Option<Lecturer>> {
        let lecturer = sqlx::query_as::<_, Lecturer>(
            "UPDATE lecturers SET name = $1, email = $2, dept = $3, designation = $4
             WHERE id = $5
             RETURNING id, name, email, dept, designation",
        )
        .bind(&lecturer.name)
        .bind(&lecturer.email)
        .bind(&lecturer.dept)
        .bind(&lecturer.designation)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lecturer)
    }

    async fn delete_lecturer(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM lecturers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn begin(&self) -> AppResult<Box<dyn LendingTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLendingTx { tx }))
    }
}

struct PgLendingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LendingTx for PgLendingTx {
    async fn decrement_availability(&mut self, book_id: i64) -> AppResult<DecrementOutcome> {
        // Conditional update: the row lock taken here serialises concurrent borrows.
        let remaining = sqlx::query_scalar::<_, i32>(
            "UPDATE books SET available_copies = available_copies - 1
             WHERE book_id = $1 AND available_copies > 0
             RETURNING available_copies",
        )
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        if remaining.is_some() {
            return Ok(DecrementOutcome::Decremented);
        }

        let exists = sqlx::query_scalar::<_, i64>("SELECT book_id FROM books WHERE book_id = $1")
            .bind(book_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(match exists {
            Some(_) => DecrementOutcome::AlreadyZero,
            None => DecrementOutcome::NotFound,
        })
    }

    async fn increment_availability(&mut self, book_id: i64) -> AppResult<IncrementOutcome> {
        let res = sqlx::query(
            "UPDATE books SET available_copies = available_copies + 1 WHERE book_id = $1",
        )
        .bind(book_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(if res.rows_affected() == 0 {
            IncrementOutcome::NotFound
        } else {
            IncrementOutcome::Incremented
        })
    }

    async fn insert_open_borrow(&mut self, borrow: &NewBorrow) -> AppResult<InsertOutcome> {
        // DO NOTHING keeps the transaction usable when the partial unique index trips.
        let res = sqlx::query(
            "INSERT INTO borrow_records (user_id, user_type, book_id, borrow_date)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, user_type, book_id) WHERE return_date IS NULL DO NOTHING",
        )
        .bind(borrow.user_id)
        .bind(borrow.user_type.as_str())
        .bind(borrow.book_id)
        .bind(borrow.borrow_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(if res.rows_affected() == 0 {
            InsertOutcome::DuplicateOpenBorrow
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn close_open_borrow(
        &mut self,
        user_id: i64,
        user_type: UserType,
        book_id: i64,
        return_date: NaiveDate,
    ) -> AppResult<u64> {
        let res = sqlx::query(
            "UPDATE borrow_records SET return_date = $4
             WHERE user_id = $1 AND user_type = $2 AND book_id = $3 AND return_date IS NULL",
        )
        .bind(user_id)
        .bind(user_type.as_str())
        .bind(book_id)
        .bind(return_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
