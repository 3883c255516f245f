//! Main-phase flow: install chectl, deploy Che, publish outputs, log in.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::che::CheHelper;
use crate::chectl::ChectlHelper;
use crate::dispatcher::Flow;
use crate::ui;

const TOTAL_STEPS: u8 = 7;

/// Runs every install step in order, stopping at the first failure.
pub struct InstallEclipseChe {
    chectl: Arc<ChectlHelper>,
    che: Arc<CheHelper>,
}

impl InstallEclipseChe {
    #[must_use]
    pub fn new(chectl: Arc<ChectlHelper>, che: Arc<CheHelper>) -> Self {
        Self { chectl, che }
    }
}

#[async_trait]
impl Flow for InstallEclipseChe {
    fn name(&self) -> &'static str {
        "install"
    }

    async fn execute(&self) -> Result<()> {
        {
            let _group = ui::step(1, TOTAL_STEPS, "Chectl [download]...");
            self.chectl.download().await?;
        }
        {
            let _group = ui::step(2, TOTAL_STEPS, "Chectl [configure]...");
            self.chectl.configure().await?;
        }
        {
            let _group = ui::step(3, TOTAL_STEPS, "Chectl [install]...");
            self.chectl.install().await?;
        }
        {
            let _group = ui::step(4, TOTAL_STEPS, "Eclipse Che [serverDeploy]...");
            self.che.server_deploy().await?;
        }
        {
            let _group = ui::step(5, TOTAL_STEPS, "Eclipse Che [sets che-url]...");
            self.che.define_che_url_output().await?;
        }
        {
            let _group = ui::step(6, TOTAL_STEPS, "Eclipse Che [sets che-token]...");
            self.che.define_che_token_output().await?;
        }
        {
            let _group = ui::step(7, TOTAL_STEPS, "Eclipse Che [login]...");
            self.che.login().await?;
        }

        ui::notice("Eclipse Che is deployed");
        Ok(())
    }
}
