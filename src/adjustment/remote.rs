//! # 远端同步适配层
//!
//! ## 设计思路
//!
//! 远端图片服务负责解码上传的图片，并可按参数渲染调整后的直方图。
//! 适配层本身不保存任何会话状态，往返状态全部由控制器持有。
//! 通过 `RemoteSync` trait 暴露三项能力，控制器只依赖 trait，测试可注入替身。
//!
//! ## 实现思路
//!
//! - 上传前先用文件签名（magic bytes）确认是图片，避免无意义的网络往返。
//! - 可重试失败（408/429/5xx、连接失败、超时）按指数退避 + 抖动重试。
//! - HTTP 状态按接口语义映射到 `AdjustError`：
//!   - upload：5xx/429/408 → `ServiceUnavailable`，其余 4xx → `InvalidImage`
//!   - adjust：404/409/410/412 → `StaleSession`，其余 → `ServiceUnavailable`
//! - 服务返回的图片均为 Base64（兼容 Data URL）。

use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{AdjustError, AdjustmentParams, Histogram, PipelineConfig, PixelBuffer};

const NETWORK_RETRY_BASE_DELAY_MS: u64 = 180;

/// 服务端渲染的直方图图片（PNG 字节）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHistogram {
    pub png: Vec<u8>,
}

/// 上传结果：服务端解码出的原图，以及可选的原图直方图。
#[derive(Debug, Clone)]
pub struct UploadResponse {
    pub original: PixelBuffer,
    pub original_histogram: Option<RenderedHistogram>,
}

/// 远端调整结果。
#[derive(Debug, Clone, Default)]
pub struct AdjustResponse {
    pub adjusted_histogram: Option<RenderedHistogram>,
}

/// 一次性处理结果（`/api/process_image`）。
#[derive(Debug, Clone)]
pub struct ProcessResponse {
    pub original: PixelBuffer,
    pub adjusted: PixelBuffer,
    pub original_histogram: Histogram,
    pub adjusted_histogram: Histogram,
}

/// 控制器依赖的远端能力。
///
/// 返回的 future 必须是 `Send`，以便在后台任务中执行。
pub trait RemoteSync: Send + Sync + 'static {
    /// 上传原始图片字节，由服务端解码。
    fn upload_image(
        &self,
        file: Bytes,
    ) -> impl Future<Output = Result<UploadResponse, AdjustError>> + Send;

    /// 请求服务端按参数重新计算调整后的直方图。
    fn request_adjustment(
        &self,
        params: AdjustmentParams,
    ) -> impl Future<Output = Result<AdjustResponse, AdjustError>> + Send;

    /// 通知服务端丢弃已保存的图片状态。
    fn clear_session(&self) -> impl Future<Output = Result<(), AdjustError>> + Send;
}

#[derive(Deserialize)]
struct UploadBody {
    original_image: String,
    #[serde(default)]
    original_histogram: Option<String>,
}

#[derive(Deserialize)]
struct AdjustBody {
    #[serde(default)]
    adjusted_histogram: Option<String>,
}

#[derive(Deserialize)]
struct ChannelCounts {
    blue: Vec<f64>,
    green: Vec<f64>,
    red: Vec<f64>,
}

#[derive(Deserialize)]
struct ProcessBody {
    original_image: String,
    adjusted_image: String,
    original_histogram: ChannelCounts,
    adjusted_histogram: ChannelCounts,
}

/// 基于 HTTP 的远端实现。
pub struct HttpRemoteSync {
    client: reqwest::Client,
    config: PipelineConfig,
}

impl HttpRemoteSync {
    /// 创建适配器，内部复用同一个 HTTP 客户端。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use luminotune::adjustment::{HttpRemoteSync, PipelineConfig};
    ///
    /// let remote = HttpRemoteSync::new(PipelineConfig::from_env())?;
    /// # Ok::<(), luminotune::adjustment::AdjustError>(())
    /// ```
    pub fn new(config: PipelineConfig) -> Result<Self, AdjustError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AdjustError::InvalidConfig(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 一次性上传并按参数处理，返回两张图与数值直方图。
    pub async fn process_image(
        &self,
        file: Bytes,
        params: AdjustmentParams,
    ) -> Result<ProcessResponse, AdjustError> {
        let extension = self.validate_upload(&file)?;
        let url = self.config.endpoint("process_image");
        let start = Instant::now();

        let response = self
            .send_with_retry(&url, || {
                let form = Form::new()
                    .part(
                        "file",
                        Part::stream(file.clone()).file_name(format!("upload.{}", extension)),
                    )
                    .text("alpha", params.alpha().to_string())
                    .text("beta", params.beta().to_string());
                self.client.post(&url).multipart(form)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::upload_status_error(status));
        }

        let body: ProcessBody = response
            .json()
            .await
            .map_err(|e| AdjustError::ServiceUnavailable(format!("处理响应格式异常：{}", e)))?;

        let original = self.decode_image_payload(&body.original_image)?;
        let adjusted = self.decode_image_payload(&body.adjusted_image)?;
        let original_histogram = Self::histogram_from_counts(body.original_histogram)?;
        let adjusted_histogram = Self::histogram_from_counts(body.adjusted_histogram)?;

        log::info!(
            "✅ 一次性处理完成 - {}x{} {} {}ms",
            original.width,
            original.height,
            params,
            start.elapsed().as_millis()
        );

        Ok(ProcessResponse {
            original,
            adjusted,
            original_histogram,
            adjusted_histogram,
        })
    }

    /// 上传前校验：非空、体积上限、文件签名为图片。返回扩展名。
    fn validate_upload(&self, file: &[u8]) -> Result<&'static str, AdjustError> {
        if file.is_empty() {
            return Err(AdjustError::InvalidImage("图片内容为空".to_string()));
        }

        if file.len() as u64 > self.config.max_upload_bytes {
            return Err(AdjustError::InvalidImage(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                file.len() as f64 / 1024.0 / 1024.0,
                self.config.max_upload_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        let kind = infer::get(file)
            .ok_or_else(|| AdjustError::InvalidImage("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(AdjustError::InvalidImage(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(kind.extension())
    }

    fn decode_image_payload(&self, payload: &str) -> Result<PixelBuffer, AdjustError> {
        let bytes = parse_base64_with_limit(payload, self.config.max_upload_bytes)?;
        PixelBuffer::decode(&bytes, &self.config).map_err(|e| match e {
            AdjustError::Decode(msg) => AdjustError::InvalidImage(msg),
            other => other,
        })
    }

    fn decode_rendered_histogram(&self, payload: Option<String>) -> Option<RenderedHistogram> {
        let payload = payload?;
        match parse_base64_with_limit(&payload, self.config.max_upload_bytes) {
            Ok(png) if infer::is_image(&png) => Some(RenderedHistogram { png }),
            Ok(_) => {
                log::warn!("⚠️ 服务返回的直方图不是图片，已忽略");
                None
            }
            Err(err) => {
                log::warn!("⚠️ 服务返回的直方图无法解析，已忽略：{}", err);
                None
            }
        }
    }

    fn histogram_from_counts(counts: ChannelCounts) -> Result<Histogram, AdjustError> {
        let to_bins = |values: Vec<f64>| -> Vec<u64> {
            values
                .into_iter()
                .map(|v| if v.is_finite() && v > 0.0 { v.round() as u64 } else { 0 })
                .collect()
        };

        Histogram::from_channels(to_bins(counts.red), to_bins(counts.green), to_bins(counts.blue))
            .map_err(|e| AdjustError::ServiceUnavailable(format!("直方图数据异常：{}", e)))
    }

    /// 发送请求；可重试失败按退避策略重发。
    ///
    /// `build` 每次尝试都会重新构建请求（multipart 表单不可复用）。
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<reqwest::Response, AdjustError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt: u8 = 1;

        loop {
            match build().send().await {
                Ok(resp) => {
                    if attempt < max_attempts && is_retryable_http_status(resp.status()) {
                        let delay_ms = compute_retry_delay_with_jitter(
                            attempt,
                            retry_after_hint_ms(resp.headers()),
                        );
                        log::warn!(
                            "⚠️ HTTP {}（第 {}/{} 次，可重试）；{}ms 后重试 - {}",
                            resp.status().as_u16(),
                            attempt,
                            max_attempts,
                            delay_ms,
                            redact_url_for_log(url)
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Ok(resp);
                }
                Err(err) => {
                    if attempt >= max_attempts || !is_retryable_network_error(&err) {
                        return Err(self.map_reqwest_error(err, url));
                    }

                    let delay_ms = compute_retry_delay_with_jitter(attempt, None);
                    log::warn!(
                        "⚠️ 网络请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        max_attempts,
                        sanitize_error_message(&err.to_string(), url),
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> AdjustError {
        let err_msg = sanitize_error_message(&e.to_string(), url);

        if e.is_timeout() {
            AdjustError::Timeout(format!("请求超时（{}秒）", self.config.request_timeout_secs))
        } else if e.is_connect() {
            AdjustError::ServiceUnavailable(format!("无法连接：{}", err_msg))
        } else {
            AdjustError::ServiceUnavailable(format!("请求失败：{}", err_msg))
        }
    }

    fn upload_status_error(status: StatusCode) -> AdjustError {
        let code = status.as_u16();
        if is_retryable_http_status(status) {
            AdjustError::ServiceUnavailable(format!("HTTP {}: {}", code, status_message(code)))
        } else {
            AdjustError::InvalidImage(format!("HTTP {}: 服务拒绝该图片", code))
        }
    }

    fn adjust_status_error(status: StatusCode) -> AdjustError {
        let code = status.as_u16();
        match code {
            404 | 409 | 410 | 412 => {
                AdjustError::StaleSession(format!("HTTP {}: 服务端没有可调整的图片", code))
            }
            _ => AdjustError::ServiceUnavailable(format!("HTTP {}: {}", code, status_message(code))),
        }
    }
}

impl RemoteSync for HttpRemoteSync {
    async fn upload_image(&self, file: Bytes) -> Result<UploadResponse, AdjustError> {
        let extension = self.validate_upload(&file)?;
        let url = self.config.endpoint("upload");
        let start = Instant::now();
        log::info!(
            "📤 上传图片 - {} bytes -> {}",
            file.len(),
            redact_url_for_log(&url)
        );

        let response = self
            .send_with_retry(&url, || {
                let part = Part::stream(file.clone()).file_name(format!("upload.{}", extension));
                self.client.post(&url).multipart(Form::new().part("image", part))
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::upload_status_error(status));
        }

        let body: UploadBody = response
            .json()
            .await
            .map_err(|e| AdjustError::ServiceUnavailable(format!("上传响应格式异常：{}", e)))?;

        let original = self.decode_image_payload(&body.original_image)?;
        let original_histogram = self.decode_rendered_histogram(body.original_histogram);

        log::info!(
            "✅ 上传完成 - {}x{} histogram={} {}ms",
            original.width,
            original.height,
            original_histogram.is_some(),
            start.elapsed().as_millis()
        );

        Ok(UploadResponse {
            original,
            original_histogram,
        })
    }

    async fn request_adjustment(&self, params: AdjustmentParams) -> Result<AdjustResponse, AdjustError> {
        let url = self.config.endpoint("adjust");
        log::debug!("📡 请求远端调整 - {}", params);

        let response = self
            .send_with_retry(&url, || self.client.post(&url).json(&params))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::adjust_status_error(status));
        }

        let body: AdjustBody = response
            .json()
            .await
            .map_err(|e| AdjustError::ServiceUnavailable(format!("调整响应格式异常：{}", e)))?;

        Ok(AdjustResponse {
            adjusted_histogram: self.decode_rendered_histogram(body.adjusted_histogram),
        })
    }

    async fn clear_session(&self) -> Result<(), AdjustError> {
        let url = self.config.endpoint("clear");
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, &url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdjustError::ServiceUnavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status_message(status.as_u16())
            )));
        }

        log::debug!("🧹 服务端会话已清理");
        Ok(())
    }
}

/// 解析 Base64 输入（支持 Data URL / 纯 Base64），解码前按体积上限快速拒绝。
pub(crate) fn parse_base64_with_limit(data: &str, max_bytes: u64) -> Result<Vec<u8>, AdjustError> {
    let normalized = data.trim();

    let payload = if normalized.starts_with("data:") {
        let base64_start = normalized
            .find(";base64,")
            .ok_or_else(|| AdjustError::InvalidImage("缺少 base64 标记".to_string()))?;
        &normalized[base64_start + 8..]
    } else {
        normalized
    };

    let estimated_len = (payload.len() as u64).saturating_add(3) / 4 * 3;
    if estimated_len > max_bytes {
        return Err(AdjustError::InvalidImage(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| AdjustError::InvalidImage(format!("Base64 解码失败：{}", e)))
}

fn retry_after_hint_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?;
    let secs = value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(secs.saturating_mul(1000))
}

fn compute_retry_delay_with_jitter(attempt: u8, server_hint_ms: Option<u64>) -> u64 {
    let exp = NETWORK_RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << (attempt.saturating_sub(1) as u32));
    let base = server_hint_ms.unwrap_or(exp);
    let jitter_bound = (base / 2).max(1);
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    base.saturating_add(seed % (jitter_bound + 1))
}

fn is_retryable_http_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn is_retryable_network_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    let msg = error.to_string().to_lowercase();
    msg.contains("connection reset") || msg.contains("connection closed before message completed")
}

/// 常见 HTTP 状态码文案。
fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        429 => "请求过于频繁",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}

fn sanitize_error_message(error_msg: &str, url: &str) -> String {
    error_msg.replace(url, &redact_url_for_log(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn png_base64(width: u32, height: u32, value: u8) -> String {
        let buffer = PixelBuffer::filled(width, height, 4, value).expect("valid buffer");
        general_purpose::STANDARD.encode(buffer.encode_png().expect("encode png"))
    }

    fn test_config(port: u16) -> PipelineConfig {
        let mut config = PipelineConfig::with_backend_url(format!("http://127.0.0.1:{}", port));
        config.max_retries = 1;
        config.request_timeout_secs = 5;
        config
    }

    /// 读取完整请求（header + Content-Length body），返回原始文本。
    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut header_end = None;
        let mut content_length = 0usize;
        let mut chunked = false;

        loop {
            if let Some(end) = header_end {
                let complete = if chunked {
                    buf.ends_with(b"0\r\n\r\n")
                } else {
                    buf.len() >= end + content_length
                };
                if complete {
                    break;
                }
            }
            let n = stream.read(&mut chunk).expect("read request failed");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if header_end.is_none() {
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    header_end = Some(pos + 4);
                    let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    content_length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(0);
                    chunked = head.contains("transfer-encoding: chunked");
                }
            }
        }

        String::from_utf8_lossy(&buf).to_string()
    }

    fn serve_once(status_line: &'static str, body: String) -> (u16, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            let request = read_request(&mut stream);

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).expect("write response failed");
            stream.flush().expect("flush failed");
            request
        });

        (port, handle)
    }

    fn tiny_png_bytes() -> Bytes {
        let buffer = PixelBuffer::filled(2, 2, 3, 0).expect("valid buffer");
        Bytes::from(buffer.encode_png().expect("encode png"))
    }

    #[tokio::test]
    async fn upload_decodes_original_and_histogram() {
        let body = format!(
            r#"{{"original_image":"{}","original_histogram":"data:image/png;base64,{}"}}"#,
            png_base64(3, 2, 9),
            png_base64(4, 4, 1)
        );
        let (port, server) = serve_once("200 OK", body);

        let remote = HttpRemoteSync::new(test_config(port)).expect("remote init failed");
        let result = remote.upload_image(tiny_png_bytes()).await.expect("upload should succeed");
        let request = server.join().expect("server thread failed");

        assert!(request.starts_with("POST /api/upload"));
        assert!(request.to_lowercase().contains("multipart/form-data"));
        assert!(request.contains("name=\"image\""));
        assert_eq!((result.original.width, result.original.height), (3, 2));
        assert!(result.original.data.chunks_exact(4).all(|p| p[0] == 9));
        assert!(result.original_histogram.is_some());
    }

    #[tokio::test]
    async fn upload_rejects_non_image_without_network() {
        let remote = HttpRemoteSync::new(test_config(1)).expect("remote init failed");
        let result = remote
            .upload_image(Bytes::from_static(b"<html><body>not an image</body></html>"))
            .await;

        assert!(matches!(result, Err(AdjustError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn upload_maps_bad_request_to_invalid_image() {
        let (port, server) = serve_once("400 Bad Request", "{}".to_string());
        let remote = HttpRemoteSync::new(test_config(port)).expect("remote init failed");

        let result = remote.upload_image(tiny_png_bytes()).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(AdjustError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn adjust_sends_params_and_maps_missing_session() {
        let (port, server) = serve_once("404 Not Found", "{}".to_string());
        let remote = HttpRemoteSync::new(test_config(port)).expect("remote init failed");
        let params = AdjustmentParams::new(2.0, 50).expect("valid params");

        let result = remote.request_adjustment(params).await;
        let request = server.join().expect("server thread failed");

        assert!(request.starts_with("POST /api/adjust"));
        assert!(request.contains(r#""alpha":2.0"#));
        assert!(request.contains(r#""beta":50"#));
        assert!(matches!(result, Err(AdjustError::StaleSession(_))));
    }

    #[tokio::test]
    async fn adjust_maps_server_error_to_unavailable() {
        let (port, server) = serve_once("503 Service Unavailable", "{}".to_string());
        let remote = HttpRemoteSync::new(test_config(port)).expect("remote init failed");

        let result = remote.request_adjustment(AdjustmentParams::default()).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(AdjustError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn adjust_returns_rendered_histogram() {
        let body = format!(r#"{{"adjusted_histogram":"{}"}}"#, png_base64(2, 2, 3));
        let (port, server) = serve_once("200 OK", body);
        let remote = HttpRemoteSync::new(test_config(port)).expect("remote init failed");

        let result = remote
            .request_adjustment(AdjustmentParams::default())
            .await
            .expect("adjust should succeed");
        server.join().expect("server thread failed");

        let rendered = result.adjusted_histogram.expect("histogram expected");
        assert!(infer::is_image(&rendered.png));
    }

    #[tokio::test]
    async fn clear_reports_unreachable_service() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let port = listener.local_addr().expect("read local addr failed").port();
        drop(listener);

        let remote = HttpRemoteSync::new(test_config(port)).expect("remote init failed");
        let result = remote.clear_session().await;

        assert!(matches!(result, Err(AdjustError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn process_image_maps_bgr_counts_to_histogram() {
        let mut red = vec![0.0; 256];
        red[5] = 4.0;
        let mut green = vec![0.0; 256];
        green[6] = 4.0;
        let mut blue = vec![0.0; 256];
        blue[7] = 4.0;
        let counts = serde_json::json!({ "blue": blue, "green": green, "red": red });

        let body = serde_json::json!({
            "original_image": png_base64(2, 2, 0),
            "adjusted_image": png_base64(2, 2, 50),
            "original_histogram": counts,
            "adjusted_histogram": counts,
        })
        .to_string();
        let (port, server) = serve_once("200 OK", body);
        let remote = HttpRemoteSync::new(test_config(port)).expect("remote init failed");
        let params = AdjustmentParams::new(2.0, 50).expect("valid params");

        let result = remote
            .process_image(tiny_png_bytes(), params)
            .await
            .expect("process should succeed");
        let request = server.join().expect("server thread failed");

        assert!(request.starts_with("POST /api/process_image"));
        assert!(request.contains("name=\"alpha\""));
        assert_eq!(result.adjusted.data[0], 50);
        assert_eq!(result.original_histogram.red()[5], 4);
        assert_eq!(result.original_histogram.green()[6], 4);
        assert_eq!(result.adjusted_histogram.blue()[7], 4);
    }

    #[test]
    fn parse_base64_accepts_data_url_and_plain() {
        let plain = general_purpose::STANDARD.encode(b"hello");
        assert_eq!(parse_base64_with_limit(&plain, 1024).expect("plain"), b"hello");

        let data_url = format!("data:image/png;base64,{}", plain);
        assert_eq!(parse_base64_with_limit(&data_url, 1024).expect("data url"), b"hello");
    }

    #[test]
    fn parse_base64_rejects_large_payload_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = parse_base64_with_limit(&huge, 32);
        assert!(matches!(result, Err(AdjustError::InvalidImage(_))));
    }

    #[test]
    fn adjust_status_mapping_is_expected() {
        assert!(matches!(
            HttpRemoteSync::adjust_status_error(StatusCode::CONFLICT),
            AdjustError::StaleSession(_)
        ));
        assert!(matches!(
            HttpRemoteSync::adjust_status_error(StatusCode::BAD_GATEWAY),
            AdjustError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            HttpRemoteSync::upload_status_error(StatusCode::TOO_MANY_REQUESTS),
            AdjustError::ServiceUnavailable(_)
        ));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted = redact_url_for_log("http://example.com:8443/api/adjust?token=abc#x");
        assert_eq!(redacted, "http://example.com:8443/api/adjust");
    }
}
