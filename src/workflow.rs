use rand::Rng;
use serde_json::{json, Value};

use crate::settings::{GenerationSettings, LoraMode};
use crate::types::WorkflowNode;

/// Builder for a generation workflow graph.
///
/// Produces the standard pipeline (CheckpointLoader, optional LoRA chain,
/// CLIP encoders, KSampler, VAEDecode, SaveImage) as the node-graph
/// JSON the backend executes. Selected LoRAs are chained between the
/// checkpoint and the sampler, one loader node per LoRA.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub checkpoint: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub sampler: String,
    pub scheduler: String,
    pub seed: Option<i64>,
    pub batch_size: u32,
    /// `(lora_name, strength)` pairs applied in selection order.
    pub loras: Vec<(String, f64)>,
}

impl WorkflowRequest {
    /// Build a request from the session settings and a checkpoint name.
    ///
    /// LoRA strengths in auto mode resolve to 1.0; manual strengths carry
    /// their configured value.
    pub fn from_settings(settings: &GenerationSettings, checkpoint: impl Into<String>) -> Self {
        let (width, height) = settings.resolved_dimensions();
        let loras = settings
            .selected_loras
            .iter()
            .map(|id| {
                let strength = settings
                    .lora_strengths
                    .get(id)
                    .map(|s| match s.mode {
                        LoraMode::Auto => 1.0,
                        LoraMode::Manual => s.value,
                    })
                    .unwrap_or(1.0);
                (id.clone(), strength)
            })
            .collect();

        Self {
            positive_prompt: settings.prompt.clone(),
            negative_prompt: settings.negative_prompt.clone(),
            checkpoint: checkpoint.into(),
            width,
            height,
            steps: settings.steps,
            cfg_scale: settings.cfg_scale,
            sampler: "dpmpp_2m".to_string(),
            scheduler: "karras".to_string(),
            seed: settings.seed,
            batch_size: settings.batch_count,
            loras,
        }
    }

    /// Set the sampler algorithm (e.g. "euler", "dpmpp_2m", "dpmpp_sde").
    pub fn sampler(mut self, sampler: impl Into<String>) -> Self {
        self.sampler = sampler.into();
        self
    }

    /// Set the noise scheduler (e.g. "normal", "karras", "exponential").
    pub fn scheduler(mut self, scheduler: impl Into<String>) -> Self {
        self.scheduler = scheduler.into();
        self
    }

    /// Build the workflow JSON and resolve the seed.
    ///
    /// Returns `(workflow_json, actual_seed)`. When no seed is set, a random
    /// seed is generated and returned so it can be stored with the output.
    pub fn build(&self) -> (Value, i64) {
        let seed = match self.seed {
            Some(s) if s >= 0 => s,
            _ => rand::rng().random_range(0..i64::MAX),
        };

        let mut workflow = json!({
            "1": {
                "class_type": "CheckpointLoaderSimple",
                "_meta": { "title": "Load Checkpoint" },
                "inputs": {
                    "ckpt_name": self.checkpoint
                }
            },
            "2": {
                "class_type": "EmptyLatentImage",
                "_meta": { "title": "Empty Latent" },
                "inputs": {
                    "width": self.width,
                    "height": self.height,
                    "batch_size": self.batch_size
                }
            }
        });

        // Chain LoRA loaders between the checkpoint and the encoders/sampler.
        // Each loader consumes the previous model/clip outputs.
        let mut model_source = ("1".to_string(), 0);
        let mut clip_source = ("1".to_string(), 1);
        for (i, (name, strength)) in self.loras.iter().enumerate() {
            let node_id = format!("{}", 10 + i);
            workflow[&node_id] = json!({
                "class_type": "LoraLoader",
                "_meta": { "title": format!("LoRA: {name}") },
                "inputs": {
                    "lora_name": name,
                    "strength_model": strength,
                    "strength_clip": strength,
                    "model": [model_source.0.clone(), model_source.1],
                    "clip": [clip_source.0.clone(), clip_source.1]
                }
            });
            model_source = (node_id.clone(), 0);
            clip_source = (node_id, 1);
        }

        workflow["3"] = json!({
            "class_type": "CLIPTextEncode",
            "_meta": { "title": "Positive Prompt" },
            "inputs": {
                "text": self.positive_prompt,
                "clip": [clip_source.0.clone(), clip_source.1]
            }
        });
        workflow["4"] = json!({
            "class_type": "CLIPTextEncode",
            "_meta": { "title": "Negative Prompt" },
            "inputs": {
                "text": self.negative_prompt,
                "clip": [clip_source.0.clone(), clip_source.1]
            }
        });
        workflow["5"] = json!({
            "class_type": "KSampler",
            "_meta": { "title": "Sampler" },
            "inputs": {
                "seed": seed,
                "steps": self.steps,
                "cfg": self.cfg_scale,
                "sampler_name": self.sampler,
                "scheduler": self.scheduler,
                "denoise": 1.0,
                "model": [model_source.0.clone(), model_source.1],
                "positive": ["3", 0],
                "negative": ["4", 0],
                "latent_image": ["2", 0]
            }
        });
        workflow["6"] = json!({
            "class_type": "VAEDecode",
            "_meta": { "title": "VAE Decode" },
            "inputs": {
                "samples": ["5", 0],
                "vae": ["1", 2]
            }
        });
        workflow["7"] = json!({
            "class_type": "SaveImage",
            "_meta": { "title": "Save Image" },
            "inputs": {
                "filename_prefix": "gen-session",
                "images": ["6", 0]
            }
        });

        (workflow, seed)
    }
}

/// Derive the ordered pipeline-step list shown on the progress card.
///
/// Nodes are sorted dependency-first: any input of the form `[node_id, slot]`
/// creates an edge. Cycles fall back to the visiting order rather than
/// failing. Titles come from `_meta.title`, else the class type.
pub fn sorted_workflow_nodes(workflow: &Value) -> Vec<WorkflowNode> {
    let Some(map) = workflow.as_object() else {
        return Vec::new();
    };

    let mut nodes: Vec<WorkflowNode> = Vec::new();
    for (node_id, node_data) in map {
        let Some(class_type) = node_data.get("class_type").and_then(|v| v.as_str()) else {
            continue;
        };
        let node_title = node_data
            .pointer("/_meta/title")
            .and_then(|v| v.as_str())
            .unwrap_or(class_type)
            .to_string();

        let mut dependencies = Vec::new();
        if let Some(inputs) = node_data.get("inputs").and_then(|v| v.as_object()) {
            for input_value in inputs.values() {
                if let Some(arr) = input_value.as_array() {
                    if arr.len() >= 2 {
                        if let Some(dep_id) = arr[0].as_str() {
                            if map.contains_key(dep_id) {
                                dependencies.push(dep_id.to_string());
                            }
                        }
                    }
                }
            }
        }

        nodes.push(WorkflowNode {
            node_id: node_id.clone(),
            class_type: class_type.to_string(),
            node_title,
            dependencies,
        });
    }

    // Depth-first topological sort; `in_progress` detects cycles, which keep
    // the visiting order instead of recursing forever.
    let mut sorted = Vec::with_capacity(nodes.len());
    let mut visited: Vec<String> = Vec::new();
    let mut ids: Vec<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
    ids.sort();

    fn visit(
        id: &str,
        nodes: &[WorkflowNode],
        visited: &mut Vec<String>,
        in_progress: &mut Vec<String>,
        sorted: &mut Vec<WorkflowNode>,
    ) {
        if in_progress.iter().any(|v| v == id) || visited.iter().any(|v| v == id) {
            return;
        }
        let Some(node) = nodes.iter().find(|n| n.node_id == id) else {
            return;
        };
        in_progress.push(id.to_string());
        for dep in &node.dependencies {
            visit(dep, nodes, visited, in_progress, sorted);
        }
        in_progress.retain(|v| v != id);
        visited.push(id.to_string());
        sorted.push(node.clone());
    }

    let mut in_progress = Vec::new();
    for id in &ids {
        visit(id, &nodes, &mut visited, &mut in_progress, &mut sorted);
    }
    sorted
}
