//! Global controller discovery.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::messaging::Payload;
use crate::CrescoClient;

/// Region and agent of the global controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalInfo {
    pub region: String,
    pub agent: String,
}

impl CrescoClient {
    /// Ask our own plugin for the global controller's location.
    ///
    /// The first complete answer is cached until the next `connect()`. A reply
    /// without `global_region` or `global_agent` yields `None`.
    pub fn global_info(&self) -> Result<Option<GlobalInfo>> {
        if let Some(info) = self.global_info.read().clone() {
            return Ok(Some(info));
        }

        let Some(plugin) = self.api_plugin_name() else {
            warn!("globalinfo requested before connect");
            return Ok(None);
        };

        let reply = self.messaging.to_plugin_by_name(
            true,
            "EXEC",
            Payload::for_action("globalinfo"),
            &plugin,
            None,
        )?;

        match (reply.get_str("global_region"), reply.get_str("global_agent")) {
            (Some(region), Some(agent)) => {
                let info = GlobalInfo {
                    region: region.to_string(),
                    agent: agent.to_string(),
                };
                debug!("Global controller at {}/{}", info.region, info.agent);
                *self.global_info.write() = Some(info.clone());
                Ok(Some(info))
            }
            _ => {
                warn!("globalinfo reply incomplete ({})", reply.outcome());
                Ok(None)
            }
        }
    }

    pub fn global_region(&self) -> Result<Option<String>> {
        Ok(self.global_info()?.map(|info| info.region))
    }

    pub fn global_agent(&self) -> Result<Option<String>> {
        Ok(self.global_info()?.map(|info| info.agent))
    }
}
