use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use driveverse_types::models::MessageKind;

use crate::error::{ApiError, ApiResult};
use crate::messages::{load_chat_for, parse_id, persist_and_relay};
use crate::middleware::AuthUser;
use crate::state::AppState;

/// Subdirectory of the upload root holding chat pictures.
const CHAT_IMAGE_DIR: &str = "chat-images";

const ALLOWED_IMAGE_TYPES: &[&str] = &["jpeg", "jpg", "png", "gif", "webp"];

struct ImagePart {
    file_name: String,
    content_type: String,
    data: Bytes,
}

/// POST /api/messages/upload: multipart form with `chatId` and `image`.
/// Saves the picture under the upload root and posts it as an image message.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut chat_id: Option<String> = None;
    let mut image: Option<ImagePart> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chatId" => chat_id = Some(field.text().await?),
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                image = Some(ImagePart {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => warn!("Ignoring unexpected upload field '{}'", other),
        }
    }

    let (Some(chat_id), Some(image)) = (chat_id, image) else {
        return Err(ApiError::BadRequest("Missing data".into()));
    };
    if image.data.is_empty() {
        return Err(ApiError::BadRequest("Missing data".into()));
    }
    if image.data.len() > state.config.max_image_bytes {
        return Err(ApiError::PayloadTooLarge);
    }
    let extension = image_extension(&image.file_name, &image.content_type)
        .ok_or_else(|| ApiError::BadRequest("Only images allowed".into()))?;

    let chat_id = parse_id(&chat_id, "Invalid chat id")?;
    let chat = load_chat_for(&state, chat_id, &user).await?;

    // Write picture to disk
    let dir = state.config.upload_dir.join(CHAT_IMAGE_DIR);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        ApiError::Internal(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let file_name = unique_file_name(&extension);
    let file_path = dir.join(&file_name);
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        ApiError::Internal(format!("Failed to create file {}: {}", file_path.display(), e))
    })?;
    file.write_all(&image.data).await.map_err(|e| {
        ApiError::Internal(format!("Failed to write file {}: {}", file_path.display(), e))
    })?;

    let public_path = format!("/uploads/{}/{}", CHAT_IMAGE_DIR, file_name);
    match persist_and_relay(&state, &chat, &user, public_path, MessageKind::Image).await {
        Ok(message) => {
            info!("{} uploaded {} ({} bytes) to chat {}", user.id, file_name, image.data.len(), chat_id);
            Ok((StatusCode::CREATED, Json(message)))
        }
        Err(e) => {
            // No message points at the picture; don't leave it behind.
            if let Err(rm) = tokio::fs::remove_file(&file_path).await {
                error!("Failed to remove orphaned upload {}: {}", file_path.display(), rm);
            }
            Err(e)
        }
    }
}

/// Both the file extension and the MIME subtype must name an accepted image
/// format. Returns the normalised extension.
fn image_extension(file_name: &str, content_type: &str) -> Option<String> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)?;
    let subtype = content_type.strip_prefix("image/")?.to_ascii_lowercase();

    if ALLOWED_IMAGE_TYPES.contains(&extension.as_str()) && ALLOWED_IMAGE_TYPES.contains(&subtype.as_str()) {
        Some(extension)
    } else {
        None
    }
}

/// `<unix millis>-<9 base36 chars>.<ext>`
fn unique_file_name(extension: &str) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{}.{}", chrono::Utc::now().timestamp_millis(), suffix, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_image_formats() {
        assert_eq!(image_extension("car.JPG", "image/jpeg").as_deref(), Some("jpg"));
        assert_eq!(image_extension("car.webp", "image/webp").as_deref(), Some("webp"));
        assert!(image_extension("car.pdf", "application/pdf").is_none());
        assert!(image_extension("car.png", "text/plain").is_none());
        assert!(image_extension("car", "image/png").is_none());
        assert!(image_extension("car.svg", "image/svg+xml").is_none());
    }

    #[test]
    fn file_names_are_unique_and_keep_extension() {
        let a = unique_file_name("png");
        let b = unique_file_name("png");
        assert_ne!(a, b);
        assert!(a.ends_with(".png"));
        let (millis, rest) = a.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rest.len(), "abcdefghi.png".len());
    }
}
