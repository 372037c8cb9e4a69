//! Germline gene catalog

use crate::types::{Gene, Region};
use std::sync::Arc;

/// Read-only source of germline gene candidates, grouped by region.
pub trait GermlineCatalog: Send + Sync {
    /// All genes for `region`, in catalog order
    fn genes(&self, region: Region) -> &[Arc<Gene>];

    /// The first `n_max_versions` genes for `region` (0 means no limit)
    fn genes_capped(&self, region: Region, n_max_versions: usize) -> &[Arc<Gene>] {
        let genes = self.genes(region);
        if n_max_versions == 0 {
            genes
        } else {
            &genes[..n_max_versions.min(genes.len())]
        }
    }
}

/// Catalog held entirely in memory, built programmatically.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    genes: [Vec<Arc<Gene>>; 3],
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_genes<I: IntoIterator<Item = Gene>>(genes: I) -> Self {
        let mut catalog = Self::new();
        for gene in genes {
            catalog.add_gene(gene);
        }
        catalog
    }

    /// Add a gene to its region. Returns `false` if a gene with the same name
    /// is already present in that region, in which case the catalog is unchanged.
    pub fn add_gene(&mut self, gene: Gene) -> bool {
        let slot = &mut self.genes[gene.region.index()];
        if slot.iter().any(|g| g.name == gene.name) {
            log::warn!("Ignoring duplicate {} gene {}", gene.region, gene.name);
            return false;
        }
        slot.push(Arc::new(gene));
        true
    }

    pub fn with_gene(mut self, gene: Gene) -> Self {
        self.add_gene(gene);
        self
    }

    pub fn get(&self, region: Region, name: &str) -> Option<&Arc<Gene>> {
        self.genes[region.index()].iter().find(|g| &*g.name == name)
    }

    pub fn len(&self) -> usize {
        self.genes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GermlineCatalog for InMemoryCatalog {
    fn genes(&self, region: Region) -> &[Arc<Gene>] {
        &self.genes[region.index()]
    }
}

impl<C: GermlineCatalog + ?Sized> GermlineCatalog for Arc<C> {
    fn genes(&self, region: Region) -> &[Arc<Gene>] {
        (**self).genes(region)
    }
}
