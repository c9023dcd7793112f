//! Pipeline and plot catalog endpoints

use butler_core::domain::definition::{Definition, DefinitionKind};
use butler_core::dto::definition::DefinitionFile;

use crate::ButlerClient;
use crate::error::Result;

impl ButlerClient {
    /// List pipeline definition files available on disk
    pub async fn list_pipelines(&self) -> Result<Vec<DefinitionFile>> {
        self.list_definitions(DefinitionKind::Pipeline).await
    }

    /// Load a pipeline definition, refreshing the catalog if its file changed
    pub async fn get_pipeline(&self, uid: &str) -> Result<Definition> {
        self.get_definition(DefinitionKind::Pipeline, uid).await
    }

    pub async fn list_plots(&self) -> Result<Vec<DefinitionFile>> {
        self.list_definitions(DefinitionKind::Plot).await
    }

    pub async fn get_plot(&self, uid: &str) -> Result<Definition> {
        self.get_definition(DefinitionKind::Plot, uid).await
    }

    async fn list_definitions(&self, kind: DefinitionKind) -> Result<Vec<DefinitionFile>> {
        let url = format!("{}/{}", self.base_url, collection(kind));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    async fn get_definition(&self, kind: DefinitionKind, uid: &str) -> Result<Definition> {
        let url = format!("{}/{}/{}", self.base_url, collection(kind), uid);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}

fn collection(kind: DefinitionKind) -> &'static str {
    match kind {
        DefinitionKind::Pipeline => "pipelines",
        DefinitionKind::Plot => "plots",
    }
}
