// routes/qrcode.rs
// GET /qrcode -> PNG QR code of the session user's otpauth URL.

use axum::{
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

use crate::error::{AppError, AppResult};
use crate::session::SessionUser;
use crate::totp::totp_for_user;

pub async fn qrcode(session: SessionUser) -> AppResult<Response> {
    let totp = totp_for_user(session.user())?;
    let code = QrCode::new(totp.get_url().as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build qr: {e}")))?;
    let img = code.render::<Luma<u8>>().min_dimensions(200, 200).build();

    // image 0.25: write_to requires Write + Seek -> Cursor<Vec<u8>>
    let mut cursor = Cursor::new(Vec::<u8>::new());
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(([(CONTENT_TYPE, "image/png")], cursor.into_inner()).into_response())
}
