use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::debug;

use crate::api::types::{
    ComputerInventory, DashboardStats, DaysQuery, InactiveComputersReport, PasswordExpiryReport,
};
use crate::directory::{ComputerQuery, DirectoryBackend, UserQuery};
use crate::services::report_service::{
    self, DEFAULT_EXPIRY_DAYS, DEFAULT_INACTIVE_DAYS, MAX_EXPIRY_DAYS, MAX_INACTIVE_DAYS,
    ReportError, ReportService, days_param,
};

pub struct DirectoryReportService {
    directory: Arc<dyn DirectoryBackend>,
    max_password_age: Duration,
}

impl DirectoryReportService {
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryBackend>, max_password_age_days: i64) -> Self {
        Self {
            directory,
            max_password_age: Duration::days(max_password_age_days),
        }
    }
}

#[async_trait]
impl ReportService for DirectoryReportService {
    async fn password_expiry(&self, query: DaysQuery) -> Result<PasswordExpiryReport, ReportError> {
        let days = days_param(query.days, DEFAULT_EXPIRY_DAYS, MAX_EXPIRY_DAYS)?;
        let users = self.directory.list_users(&UserQuery::default()).await?;
        let now = Utc::now();

        let users = report_service::expiring_passwords(&users, self.max_password_age, days, now);
        debug!(days, count = users.len(), "Computed password expiry report");

        Ok(PasswordExpiryReport {
            total_count: users.len(),
            users,
            days_threshold: days,
        })
    }

    async fn inactive_computers(
        &self,
        query: DaysQuery,
    ) -> Result<InactiveComputersReport, ReportError> {
        let days = days_param(query.days, DEFAULT_INACTIVE_DAYS, MAX_INACTIVE_DAYS)?;
        let computers = self
            .directory
            .list_computers(&ComputerQuery::default())
            .await?;

        let computers = report_service::inactive_computers(&computers, days, Utc::now());
        Ok(InactiveComputersReport {
            total_count: computers.len(),
            computers,
            days_threshold: days,
        })
    }

    async fn computer_inventory(&self) -> Result<ComputerInventory, ReportError> {
        let computers = self
            .directory
            .list_computers(&ComputerQuery::default())
            .await?;
        Ok(report_service::inventory(&computers))
    }

    async fn dashboard(&self) -> Result<DashboardStats, ReportError> {
        let users_query = UserQuery::default();
        let computers_query = ComputerQuery::default();
        let (users, computers, groups) = tokio::try_join!(
            self.directory.list_users(&users_query),
            self.directory.list_computers(&computers_query),
            self.directory.list_groups(),
        )?;

        Ok(report_service::dashboard(
            &users,
            &computers,
            &groups,
            self.max_password_age,
            Utc::now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::domain::DistinguishedName;

    fn service() -> DirectoryReportService {
        let base = DistinguishedName::parse("DC=example,DC=com").unwrap();
        DirectoryReportService::new(Arc::new(MemoryDirectory::seeded(base)), 90)
    }

    #[tokio::test]
    async fn test_password_expiry_on_sample_directory() {
        let report = service()
            .password_expiry(DaysQuery { days: Some(7) })
            .await
            .unwrap();
        let names: Vec<&str> = report
            .users
            .iter()
            .map(|u| u.sam_account_name.as_str())
            .collect();
        assert_eq!(names, vec!["admin.user", "john.doe"]);
        assert_eq!(report.days_threshold, 7);

        let err = service()
            .password_expiry(DaysQuery { days: Some(91) })
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[tokio::test]
    async fn test_inactive_computers_on_sample_directory() {
        let report = service()
            .inactive_computers(DaysQuery::default())
            .await
            .unwrap();
        let names: Vec<&str> = report.computers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["PC-OLD", "LAPTOP-002"]);
    }

    #[tokio::test]
    async fn test_dashboard_on_sample_directory() {
        let stats = service().dashboard().await.unwrap();
        assert_eq!(stats.total_users, 5);
        assert_eq!(stats.disabled_users, 1);
        assert_eq!(stats.total_groups, 6);
        assert!(stats.computers_by_os.contains_key("Windows 10 Pro"));
    }
}
