//! Authorized archive transfer with manual redirect handling.

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::LOCATION;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::client::Client;
use crate::control::CallControl;
use crate::error::{AuthError, DownloadError};
use crate::util::{is_plain_file_name, is_redirect, product_value_url, urljoin};

impl Client {
    /// Downloads product `product_id` into `<destination_dir>/<identifier>.zip`.
    ///
    /// The archive service answers with a chain of redirects to a storage
    /// host. Hops are walked by hand, carrying the bearer token, up to the
    /// client's redirect limit; the resolved URL is then fetched with
    /// automatic redirects enabled and the body streamed to disk.
    /// A failed transfer may leave a partial file behind.
    pub fn download(
        &self,
        product_id: &str,
        identifier: &str,
        destination_dir: &Path,
        control: &CallControl,
    ) -> Result<PathBuf, DownloadError> {
        // The identifier comes from the catalog and must not leave `destination_dir`.
        if !is_plain_file_name(identifier) {
            return Err(DownloadError::InvalidIdentifier {
                identifier: identifier.to_string(),
            });
        }

        let token = self.token(control).map_err(|source| match source {
            AuthError::Interrupted(reason) => DownloadError::interrupted(identifier, reason),
            source => DownloadError::Auth {
                identifier: identifier.to_string(),
                source,
            },
        })?;

        let mut url = product_value_url(&self.config.data_url, product_id);
        let session = self
            .session(&token, false)
            .map_err(|e| transport_error(identifier, &url, e))?;

        let mut resp = self.fetch(&session, &url, identifier, control, true)?;
        let mut hops = 0usize;
        while is_redirect(resp.status()) {
            if hops >= self.max_redirects {
                return Err(DownloadError::TooManyRedirects {
                    identifier: identifier.to_string(),
                    limit: self.max_redirects,
                });
            }
            let next = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| urljoin(&url, loc))
                .ok_or_else(|| DownloadError::MissingLocation {
                    identifier: identifier.to_string(),
                    url: url.clone(),
                })?;
            hops += 1;
            debug!(%identifier, hop = hops, from = %url, to = %next, "following redirect");
            url = next;
            resp = self.fetch(&session, &url, identifier, control, true)?;
        }
        drop(resp);

        let session = self
            .session(&token, true)
            .map_err(|e| transport_error(identifier, &url, e))?;
        let resp = self.fetch(&session, &url, identifier, control, false)?;
        let status = resp.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate(&self.credentials);
            }
            return Err(DownloadError::Status {
                identifier: identifier.to_string(),
                url,
                status: status.as_u16(),
            });
        }

        let target = destination_dir.join(format!("{identifier}.zip"));
        let written = self.write_body(resp, &target, identifier, control)?;
        info!(%identifier, bytes = written, path = %target.display(), "archive downloaded");
        Ok(target)
    }

    // `bounded` requests carry the per-request timeout; the archive body
    // itself is only bounded by the caller's deadline.
    fn fetch(
        &self,
        session: &HttpClient,
        url: &str,
        identifier: &str,
        control: &CallControl,
        bounded: bool,
    ) -> Result<Response, DownloadError> {
        let interrupted = |reason| DownloadError::interrupted(identifier, reason);
        let mut req = session.get(url);
        if bounded {
            req = req.timeout(control.request_timeout(self.timeout).map_err(interrupted)?);
        } else {
            control.check().map_err(interrupted)?;
            if control.deadline().is_some() {
                let left = control
                    .request_timeout(std::time::Duration::MAX)
                    .map_err(interrupted)?;
                req = req.timeout(left);
            }
        }
        req.send().map_err(|e| transport_error(identifier, url, e))
    }

    fn write_body(
        &self,
        mut resp: Response,
        target: &Path,
        identifier: &str,
        control: &CallControl,
    ) -> Result<u64, DownloadError> {
        let io_error = |source| DownloadError::Io {
            identifier: identifier.to_string(),
            path: target.to_path_buf(),
            source,
        };
        let mut out = File::create(target).map_err(io_error)?;

        let pb = if self.progress {
            let pb = ProgressBar::new(resp.content_length().unwrap_or(0));
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
            );
            pb.set_message(identifier.to_string());
            Some(pb)
        } else {
            None
        };

        let mut written: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            if let Err(reason) = control.check() {
                if let Some(pb) = &pb {
                    pb.abandon();
                }
                return Err(DownloadError::interrupted(identifier, reason));
            }
            let n = match resp.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => return Err(io_error(e)),
            };
            out.write_all(&buf[..n]).map_err(io_error)?;
            written += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }
        out.flush().map_err(io_error)?;

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        Ok(written)
    }
}

fn transport_error(identifier: &str, url: &str, source: reqwest::Error) -> DownloadError {
    DownloadError::Transport {
        identifier: identifier.to_string(),
        url: url.to_string(),
        source,
    }
}
