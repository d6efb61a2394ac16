use std::time::Duration;

use lfconfig::ServerSettings;
use reqwest::blocking::Client;
use reqwest::Url;
use tracing::{info, warn};

use crate::session::{RatingScale, ResultSubmission};
use crate::SessionError;

/// Talks to the experiment server: rating scale in, results out.
#[derive(Debug, Clone)]
pub struct ExperimentClient {
    http: Client,
    base: Url,
    results_path: String,
    rating_scale_path: String,
}

impl ExperimentClient {
    pub fn new(settings: &ServerSettings, timeout: Duration) -> Result<Self, SessionError> {
        let mut base = settings.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|err| SessionError::Url {
            url: settings.base_url.clone(),
            reason: err.to_string(),
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| SessionError::Http {
                url: base.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base,
            results_path: settings.results_path.clone(),
            rating_scale_path: settings.rating_scale_path.clone(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, SessionError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| SessionError::Url {
                url: path.to_string(),
                reason: err.to_string(),
            })
    }

    pub fn try_fetch_rating_scale(&self) -> Result<RatingScale, SessionError> {
        let url = self.endpoint(&self.rating_scale_path)?;
        let http_err = |source| SessionError::Http {
            url: url.to_string(),
            source,
        };
        let labels: Vec<String> = self
            .http
            .get(url.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(http_err)?;
        RatingScale::from_labels(labels)
    }

    /// Server scale, or `fallback` when the server cannot provide one.
    pub fn fetch_rating_scale(&self, fallback: RatingScale) -> RatingScale {
        match self.try_fetch_rating_scale() {
            Ok(scale) => scale,
            Err(err) => {
                warn!(error = %err, "using default rating scale");
                fallback
            }
        }
    }

    /// Posts the results and returns the server's JSON reply.
    pub fn submit(&self, submission: &ResultSubmission) -> Result<serde_json::Value, SessionError> {
        let url = self.endpoint(&self.results_path)?;
        let reply = self
            .http
            .post(url.clone())
            .json(submission)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(|source| SessionError::Http {
                url: url.to_string(),
                source,
            })?;
        info!(
            test_id = %submission.test_id,
            ratings = submission.rating.len(),
            "submitted results"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;

    /// Answers a single request with `status` and `body`, returning what it received.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                let end = line == "\r\n";
                request.push_str(&line);
                if end {
                    break;
                }
            }
            let mut payload = vec![0; content_length];
            reader.read_exact(&mut payload).unwrap();
            request.push_str(&String::from_utf8(payload).unwrap());

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            request
        });
        (base, handle)
    }

    fn client(base: String) -> ExperimentClient {
        let settings = ServerSettings {
            base_url: base,
            ..ServerSettings::default()
        };
        ExperimentClient::new(&settings, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn fetches_rating_scale_from_server() {
        let (base, server) = serve_once("200 OK", r#"["Good","Okay","Bad"]"#);
        let scale = client(base).try_fetch_rating_scale().unwrap();
        assert_eq!(scale.labels(), ["Good", "Okay", "Bad"]);
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /api/getACR_Scale/ "), "{request}");
    }

    #[test]
    fn falls_back_when_server_errors() {
        let (base, server) = serve_once("500 Internal Server Error", "{}");
        let scale = client(base).fetch_rating_scale(RatingScale::dsis());
        assert_eq!(scale, RatingScale::dsis());
        server.join().unwrap();
    }

    #[test]
    fn posts_results_as_json() {
        let (base, server) = serve_once("200 OK", r#"{"message":"Data saved successfully"}"#);
        let submission = ResultSubmission {
            test_id: "p01".into(),
            scene_ids: vec!["a".into(), "b".into()],
            rating: vec!["5 - Excellent".into(), "2 - Poor".into()],
        };
        let reply = client(base).submit(&submission).unwrap();
        assert_eq!(reply["message"], "Data saved successfully");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/write_light_field_results "));
        let body = request.split("\r\n\r\n").nth(1).unwrap();
        let sent: ResultSubmission = serde_json::from_str(body).unwrap();
        assert_eq!(sent, submission);
    }
}
