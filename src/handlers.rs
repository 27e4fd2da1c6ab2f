use std::{future::Future, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    AppState,
    cache::{book_key, lecturer_key, student_key},
    errors::{AppError, AppResult},
    extractor::JsonBody,
    models::{
        Book, BorrowRecord, CreateBookRequest, Lecturer, LecturerRequest, LendingRequest,
        StatusResponse, Student, StudentRequest,
    },
};

/// Health check endpoint.
#[must_use]
#[allow(clippy::unused_async)]
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create a student.
///
/// # Errors
/// Returns validation or database errors.
pub async fn create_student(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<StudentRequest>,
) -> AppResult<(StatusCode, Json<Student>)> {
    payload.validate()?;

    let student = state.store.create_student(&payload).await?;
    state.cache.write(&student_key(student.id), &student).await;
    Ok((StatusCode::CREATED, Json(student)))
}

/// Get a student by id, through the cache.
///
/// # Errors
/// Returns not found or database errors.
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Student>> {
    let student = state
        .cache
        .read_through(&student_key(id), || state.store.get_student(id))
        .await?
        .ok_or_else(|| AppError::not_found("student not found"))?;
    Ok(Json(student))
}

/// Replace a student's fields.
///
/// # Errors
/// Returns validation, not found or database errors.
pub async fn update_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<StudentRequest>,
) -> AppResult<Json<Student>> {
    payload.validate()?;

    let student = state
        .store
        .update_student(id, &payload)
        .await?
        .ok_or_else(|| AppError::not_found("student not found"))?;
    state.cache.write(&student_key(id), &student).await;
    Ok(Json(student))
}

/// Delete a student.
///
/// # Errors
/// Returns not found or database errors.
pub async fn delete_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<StatusResponse>> {
    if !state.store.delete_student(id).await? {
        return Err(AppError::not_found("student not found"));
    }
    state.cache.invalidate(&student_key(id)).await;
    Ok(Json(StatusResponse::new("student deleted")))
}

/// Create a lecturer.
///
/// # Errors
/// Returns validation or database errors.
pub async fn create_lecturer(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<LecturerRequest>,
) -> AppResult<(StatusCode, Json<Lecturer>)> {
    payload.validate()?;

    let lecturer = state.store.create_lecturer(&payload).await?;
    state.cache.write(&lecturer_key(lecturer.id), &lecturer).await;
    Ok((StatusCode::CREATED, Json(lecturer)))
}

/// Get a lecturer by id, through the cache.
///
/// # Errors
/// Returns not found or database errors.
pub async fn get_lecturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Lecturer>> {
    let lecturer = state
        .cache
        .read_through(&lecturer_key(id), || state.store.get_lecturer(id))
        .await?
        .ok_or_else(|| AppError::not_found("lecturer not found"))?;
    Ok(Json(lecturer))
}

/// Replace a lecturer's fields.
///
/// # Errors
/// Returns validation, not found or database errors.
pub async fn update_lecturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<LecturerRequest>,
) -> AppResult<Json<Lecturer>> {
    payload.validate()?;

    let lecturer = state
        .store
        .update_lecturer(id, &payload)
        .await?
        .ok_or_else(|| AppError::not_found("lecturer not found"))?;
    state.cache.write(&lecturer_key(id), &lecturer).await;
    Ok(Json(lecturer))
}

/// Delete a lecturer.
///
/// # Errors
/// Returns not found or database errors.
pub async fn delete_lecturer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<StatusResponse>> {
    if !state.store.delete_lecturer(id).await? {
        return Err(AppError::not_found("lecturer not found"));
    }
    state.cache.invalidate(&lecturer_key(id)).await;
    Ok(Json(StatusResponse::new("lecturer deleted")))
}

/// Add a book to the inventory.
///
/// # Errors
/// Returns validation or database errors.
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<CreateBookRequest>,
) -> AppResult<(StatusCode, Json<Book>)> {
    payload.validate()?;

    let book = state.store.create_book(&payload).await?;
    state.cache.write(&book_key(book.book_id), &book).await;
    Ok((StatusCode::CREATED, Json(book)))
}

/// List all books.
///
/// # Errors
/// Returns database errors.
pub async fn list_books(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Book>>> {
    Ok(Json(state.store.list_books().await?))
}

/// Get a single book by id, through the cache.
///
/// # Errors
/// Returns not found or database errors.
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state
        .cache
        .read_through(&book_key(id), || state.store.get_book(id))
        .await?
        .ok_or_else(|| AppError::not_found("book not found"))?;
    Ok(Json(book))
}

/// Borrow ledger of a book, oldest first.
///
/// # Errors
/// Returns not found or database errors.
pub async fn borrow_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<BorrowRecord>>> {
    if state.store.get_book(id).await?.is_none() {
        return Err(AppError::not_found("book not found"));
    }
    Ok(Json(state.store.borrow_history(id).await?))
}

/// Borrow a book.
///
/// # Errors
/// Returns validation, not found, unavailable, conflict or database errors.
pub async fn borrow_book(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<LendingRequest>,
) -> AppResult<(StatusCode, Json<StatusResponse>)> {
    let status = detached(async move { state.lending.borrow(&body).await }).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

/// Return a borrowed book.
///
/// # Errors
/// Returns validation, not found or database errors.
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<LendingRequest>,
) -> AppResult<(StatusCode, Json<StatusResponse>)> {
    let status = detached(async move { state.lending.return_book(&body).await }).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

/// Run a lending operation on its own task so a client hanging up cannot
/// cancel it between its store calls.
async fn detached<T, F>(fut: F) -> AppResult<T>
where
    T: Send + 'static,
    F: Future<Output = AppResult<T>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| AppError::Anyhow(e.into()))?
}
