//! Attachment upload/serve API handlers.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hearth_core::{Error, MessageView};
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// An upload after its multipart fields have been collected.
#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    receiver_id: String,
    home_id: String,
    booking_id: Option<String>,
}

struct UploadedFile {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

fn multipart_error(e: MultipartError, max_size: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        // Body limit tripped before the per-file check could run.
        return Error::AttachmentTooLarge { max: max_size }.into();
    }
    tracing::warn!(error = %e, "Malformed multipart upload");
    ApiError::BadRequest(e.body_text())
}

/// Collect the form, rejecting the file as soon as its type or size is wrong.
async fn read_form(state: &AppState, multipart: &mut Multipart) -> Result<UploadForm, ApiError> {
    let policy = state.attachments.policy();
    let mut form = UploadForm::default();
    let bad_form = |e| multipart_error(e, policy.max_size);

    while let Some(mut field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                if form.file.is_some() {
                    return Err(ApiError::BadRequest(
                        "Only one file may be sent per request".to_string(),
                    ));
                }
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                policy.check_type(&mime_type)?;

                let file_name = field.file_name().unwrap_or("attachment").to_string();
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(bad_form)? {
                    data.extend_from_slice(&chunk);
                    policy.check_size(data.len())?;
                }

                form.file = Some(UploadedFile {
                    name: file_name,
                    mime_type,
                    data,
                });
            }
            "receiverId" => form.receiver_id = field.text().await.map_err(bad_form)?,
            "homeId" => form.home_id = field.text().await.map_err(bad_form)?,
            "bookingId" => {
                let text = field.text().await.map_err(bad_form)?;
                form.booking_id = Some(text).filter(|b| !b.trim().is_empty());
            }
            _ => {
                // Skip unknown fields
            }
        }
    }

    Ok(form)
}

/// POST /api/chat/send-file
///
/// Multipart form fields:
/// - `file`: the binary data, with its content type and file name
/// - `receiverId`, `homeId`: required
/// - `bookingId`: optional
///
/// Responds `201 {"message": <MessageView>}`.
pub async fn send_file(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let form = read_form(&state, &mut multipart).await?;

    let file = form.file.ok_or(Error::MissingAttachment)?;
    if form.receiver_id.trim().is_empty() || form.home_id.trim().is_empty() {
        return Err(Error::MissingFields("Missing receiverId or homeId".to_string()).into());
    }
    if form.receiver_id == user.user_id {
        return Err(Error::CannotMessageSelf.into());
    }

    let attachment = state
        .attachments
        .save(&file.name, &file.mime_type, &file.data)
        .await?;

    let sender_id = user.user_id.clone();
    let stored = attachment.clone();
    let result: hearth_core::Result<MessageView> = state
        .store(move |messages| {
            messages.send_attachment(
                &sender_id,
                &form.receiver_id,
                &form.home_id,
                form.booking_id,
                stored,
            )
        })
        .await;

    let view = match result {
        Ok(view) => view,
        Err(e) => {
            // Roll back the stored file.
            state.attachments.remove(&attachment).await;
            return Err(e.into());
        }
    };

    state.broadcast_new_message(&view);

    Ok((StatusCode::CREATED, Json(json!({ "message": view }))))
}

/// GET /uploads/chat-files/:name
///
/// Serve a stored attachment with caching headers.
pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    match state.attachments.read(&name).await? {
        Some((data, content_type)) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                // Stored names are unique, so the bytes never change.
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            Body::from(data),
        )
            .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "File not found" })),
        )
            .into_response()),
    }
}
