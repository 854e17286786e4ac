use chrono::Utc;
use rand::Rng;
use shared::{
    domain::{JobId, JobKind},
    error::{ApiError, ApiResult},
    model::{Job, NewJob},
    validation::{format_salary, validate_job_contact},
};
use tokio::sync::RwLock;
use tracing::info;

pub const DEFAULT_EDUCATION_LEVEL: &str = "SMA/SMK";
pub const NO_EXPERIENCE_TAG: &str = "Tanpa Pengalaman";
const JOB_ID_LEN: usize = 9;
const JOB_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Locally held job listings, newest first.
#[derive(Default)]
pub struct JobBoard {
    jobs: RwLock<Vec<Job>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post(&self, job: NewJob) -> ApiResult<Job> {
        for (field, value) in [
            ("Title", &job.title),
            ("Company", &job.company),
            ("Location", &job.location),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::validation(format!("{field} is required")));
            }
        }
        validate_job_contact(&job.contact)?;

        let education_level = match job.education_level.trim() {
            "" => DEFAULT_EDUCATION_LEVEL.to_string(),
            level => level.to_string(),
        };
        let job = Job {
            id: generate_job_id(),
            title: job.title.trim().to_string(),
            company: job.company.trim().to_string(),
            location: job.location.trim().to_string(),
            kind: job.kind,
            tags: vec![education_level, NO_EXPERIENCE_TAG.to_string()],
            salary: format_salary(&job.salary),
            description: job.description,
            posted_at: Utc::now(),
            contact: job.contact.trim().to_string(),
        };

        self.jobs.write().await.insert(0, job.clone());
        info!(job_id = %job.id, kind = job.kind.label(), "job posted");
        Ok(job)
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.read().await.clone()
    }

    pub async fn by_kind(&self, kind: JobKind) -> Vec<Job> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|job| job.kind == kind)
            .cloned()
            .collect()
    }
}

fn generate_job_id() -> JobId {
    let mut rng = rand::thread_rng();
    JobId(
        (0..JOB_ID_LEN)
            .map(|_| JOB_ID_ALPHABET[rng.gen_range(0..JOB_ID_ALPHABET.len())] as char)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: &str, kind: JobKind, contact: &str) -> NewJob {
        NewJob {
            title: title.to_string(),
            company: "Logistik Jaya Abadi".to_string(),
            location: "Jakarta Barat".to_string(),
            kind,
            salary: "Rp 4500000".to_string(),
            description: "Rekap data barang".to_string(),
            contact: contact.to_string(),
            education_level: String::new(),
        }
    }

    #[tokio::test]
    async fn post_formats_salary_and_tags() {
        let board = JobBoard::new();
        let job = board
            .post(listing("Staff Admin", JobKind::FullTime, "0812-3456-7890"))
            .await
            .expect("post");

        assert_eq!(job.salary, "4.500.000");
        assert_eq!(job.tags, vec!["SMA/SMK".to_string(), "Tanpa Pengalaman".to_string()]);
        assert_eq!(job.id.as_str().len(), 9);
    }

    #[tokio::test]
    async fn newest_job_comes_first_and_filters_by_kind() {
        let board = JobBoard::new();
        board
            .post(listing("First", JobKind::FullTime, "hrd@example.com"))
            .await
            .expect("first");
        board
            .post(listing("Second", JobKind::PartTime, "+6281234567890"))
            .await
            .expect("second");

        let titles: Vec<_> = board.jobs().await.into_iter().map(|j| j.title).collect();
        assert_eq!(titles, vec!["Second", "First"]);
        assert_eq!(board.by_kind(JobKind::FullTime).await.len(), 1);
        assert!(board.by_kind(JobKind::Internship).await.is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_contact_and_missing_fields() {
        let board = JobBoard::new();
        let err = board
            .post(listing("Barista", JobKind::PartTime, "call me"))
            .await
            .expect_err("contact");
        assert_eq!(err.code, shared::error::ErrorCode::Validation);

        let err = board
            .post(listing("  ", JobKind::PartTime, "hrd@example.com"))
            .await
            .expect_err("title");
        assert_eq!(err.message, "Title is required");
        assert!(board.jobs().await.is_empty());
    }
}
