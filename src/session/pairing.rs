//! Device linking: QR payloads and numeric pairing codes.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::warn;
use qrcode::{render::unicode, types::QrError, QrCode};

use super::error::{SessionError, COMPANION_HELLO_MARKER};
use super::remote::{QrCredentials, RemoteSession};

/// Wait before asking again after a handshake error.
pub const PAIRING_CODE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retries after the first request; four requests in total.
pub const MAX_PAIRING_CODE_RETRIES: u32 = 3;

/// `ref,base64(staticKey),base64(identityKey),advSecret,platform`
pub fn qr_payload(credentials: &QrCredentials) -> String {
    format!(
        "{},{},{},{},{}",
        credentials.current_ref,
        STANDARD.encode(&credentials.static_key),
        STANDARD.encode(&credentials.identity_key),
        credentials.adv_secret_key,
        credentials.platform
    )
}

/// Render a QR payload for display in a terminal.
pub fn render_qr_ascii(data: &str) -> Result<String, QrError> {
    let code = QrCode::new(data.as_bytes())?;

    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(image)
}

/// Request a pairing code, retrying while the remote reports `CompanionHello`.
///
/// Any error that is not retried here, including the last `CompanionHello`,
/// becomes [`SessionError::PairingFailed`], which `initialize` treats as
/// transient.
pub async fn request_pairing_code(
    remote: &dyn RemoteSession,
    phone_number: &str,
    show_notification: bool,
) -> Result<String, SessionError> {
    let mut retries = 0;

    loop {
        match remote
            .start_code_linking(phone_number, show_notification)
            .await
        {
            Ok(code) => return Ok(code),
            Err(err) if err.message.contains(COMPANION_HELLO_MARKER) => {
                if retries >= MAX_PAIRING_CODE_RETRIES {
                    return Err(SessionError::PairingFailed(err.message));
                }
                retries += 1;
                warn!(
                    "pairing code request hit {}, retry {}/{} in {:?}",
                    COMPANION_HELLO_MARKER, retries, MAX_PAIRING_CODE_RETRIES, PAIRING_CODE_RETRY_DELAY
                );
                tokio::time::sleep(PAIRING_CODE_RETRY_DELAY).await;
            }
            Err(err) => return Err(SessionError::PairingFailed(err.message)),
        }
    }
}
