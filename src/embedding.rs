//! Embedding adapter + density clusterer for C11's embed-then-cluster mode.
//! Grounded on `original_source/.../embeddings/embedder.py` (embed texts
//! into vectors via a single provider call) and `clusterer.py` (HDBSCAN with
//! `min_cluster_size=2`, euclidean metric, "eom" cluster selection).
//!
//! HDBSCAN itself isn't reimplemented; `DensityClusterer` approximates its
//! `min_cluster_size`/noise-label contract with single-linkage clustering
//! over a cosine-similarity threshold (a deliberate simplification, recorded
//! in DESIGN.md) — groups below `min_cluster_size` are relabeled as noise
//! (`-1`), exactly like HDBSCAN's convention that `embedding_grouper.py`
//! depends on.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
   pub api_base_url:         String,
   pub api_key:              Option<String>,
   pub model:                String,
   pub request_timeout_secs: u64,
   pub connect_timeout_secs: u64,
}

pub trait EmbeddingAdapter: Send + Sync {
   fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
   model: &'a str,
   input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
   embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
   #[serde(default)]
   data: Vec<EmbeddingDatum>,
}

/// Blocking HTTP adapter for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbeddingAdapter {
   settings: EmbeddingSettings,
   client:   reqwest::blocking::Client,
}

impl HttpEmbeddingAdapter {
   pub fn new(settings: EmbeddingSettings) -> Self {
      let client = reqwest::blocking::Client::builder()
         .timeout(Duration::from_secs(settings.request_timeout_secs))
         .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
         .build()
         .expect("failed to build HTTP client");
      Self { settings, client }
   }
}

impl EmbeddingAdapter for HttpEmbeddingAdapter {
   fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      if texts.is_empty() {
         return Ok(Vec::new());
      }

      let request = EmbeddingRequest { model: &self.settings.model, input: texts };
      let mut builder = self
         .client
         .post(format!("{}/embeddings", self.settings.api_base_url))
         .header("content-type", "application/json");
      if let Some(key) = &self.settings.api_key {
         builder = builder.header("Authorization", format!("Bearer {key}"));
      }

      let response = builder
         .json(&request)
         .send()
         .map_err(|e| AdapterError::Transport(e.to_string()))?;
      let status = response.status();
      let body = response
         .text()
         .map_err(|e| AdapterError::Transport(e.to_string()))?;

      if !status.is_success() {
         return Err(AdapterError::Http { status: status.as_u16(), body }.into());
      }

      let parsed: EmbeddingResponse =
         serde_json::from_str(&body).map_err(|e| AdapterError::Unparseable(e.to_string()))?;
      if parsed.data.len() != texts.len() {
         return Err(
            AdapterError::MissingField(format!(
               "expected {} embeddings, got {}",
               texts.len(),
               parsed.data.len()
            ))
            .into(),
         );
      }
      Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
   }
}

struct UnionFind {
   parent: Vec<usize>,
   rank:   Vec<usize>,
}

impl UnionFind {
   fn new(n: usize) -> Self {
      Self { parent: (0..n).collect(), rank: vec![0; n] }
   }

   fn find(&mut self, x: usize) -> usize {
      if self.parent[x] != x {
         self.parent[x] = self.find(self.parent[x]);
      }
      self.parent[x]
   }

   fn union(&mut self, a: usize, b: usize) {
      let (ra, rb) = (self.find(a), self.find(b));
      if ra == rb {
         return;
      }
      if self.rank[ra] < self.rank[rb] {
         self.parent[ra] = rb;
      } else if self.rank[ra] > self.rank[rb] {
         self.parent[rb] = ra;
      } else {
         self.parent[rb] = ra;
         self.rank[ra] += 1;
      }
   }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
   let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
   let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
   let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
   if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

/// Single-linkage approximation of HDBSCAN: union points whose cosine
/// similarity clears `similarity_threshold`, then relabel any resulting
/// group smaller than `min_cluster_size` as noise (`-1`).
pub struct DensityClusterer {
   pub min_cluster_size:     usize,
   pub similarity_threshold: f32,
}

impl Default for DensityClusterer {
   fn default() -> Self {
      Self { min_cluster_size: 2, similarity_threshold: 0.75 }
   }
}

impl DensityClusterer {
   pub fn cluster(&self, embeddings: &[Vec<f32>]) -> Vec<i32> {
      let n = embeddings.len();
      if n == 0 {
         return Vec::new();
      }

      let mut uf = UnionFind::new(n);
      for i in 0..n {
         for j in (i + 1)..n {
            if cosine_similarity(&embeddings[i], &embeddings[j]) >= self.similarity_threshold {
               uf.union(i, j);
            }
         }
      }

      let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
      for i in 0..n {
         groups.entry(uf.find(i)).or_default().push(i);
      }

      let mut labels = vec![-1i32; n];
      let mut next_label = 0i32;
      for members in groups.values() {
         if members.len() >= self.min_cluster_size {
            for &m in members {
               labels[m] = next_label;
            }
            next_label += 1;
         }
      }
      labels
   }
}

#[cfg(test)]
pub(crate) struct StaticEmbeddingAdapter;

#[cfg(test)]
impl EmbeddingAdapter for StaticEmbeddingAdapter {
   fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      Ok(texts
         .iter()
         .map(|t| vec![t.len() as f32, t.chars().filter(|c| c.is_alphabetic()).count() as f32])
         .collect())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn identical_vectors_cluster_together() {
      let clusterer = DensityClusterer::default();
      let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
      let labels = clusterer.cluster(&embeddings);
      assert_eq!(labels[0], labels[1]);
      assert_ne!(labels[0], -1);
   }

   #[test]
   fn singleton_far_from_others_is_noise() {
      let clusterer = DensityClusterer { min_cluster_size: 2, similarity_threshold: 0.99 };
      let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
      let labels = clusterer.cluster(&embeddings);
      assert!(labels.iter().all(|&l| l == -1));
   }

   #[test]
   fn empty_input_yields_empty_labels() {
      let clusterer = DensityClusterer::default();
      assert!(clusterer.cluster(&[]).is_empty());
   }
}
