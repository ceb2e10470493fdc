//! 通用无向图
//!
//! 顶点存放在数组中，以下标作为顶点 ID，邻接表保存邻居下标。
//! 棋盘拓扑与成三检测都建立在这里的广度优先搜索之上。

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::error::GraphError;

/// 顶点 ID
pub type VertexId = usize;

/// 无向图
#[derive(Debug, Clone, PartialEq)]
pub struct Graph<T> {
    vertices: Vec<T>,
    adjacency: Vec<Vec<VertexId>>,
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            adjacency: Vec::new(),
        }
    }
}

impl<T> Graph<T> {
    /// 创建空图
    pub fn new() -> Self {
        Self::default()
    }

    /// 从顶点列表创建（无边）
    pub fn with_vertices(vertices: Vec<T>) -> Self {
        let adjacency = vec![Vec::new(); vertices.len()];
        Self {
            vertices,
            adjacency,
        }
    }

    /// 添加顶点，返回其 ID
    pub fn add_vertex(&mut self, vertex: T) -> VertexId {
        self.vertices.push(vertex);
        self.adjacency.push(Vec::new());
        self.vertices.len() - 1
    }

    /// 顶点数量
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// 检查顶点是否存在
    pub fn contains(&self, id: VertexId) -> bool {
        id < self.vertices.len()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&T> {
        self.vertices.get(id)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut T> {
        self.vertices.get_mut(id)
    }

    /// 按 ID 顺序遍历所有顶点
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &T)> {
        self.vertices.iter().enumerate()
    }

    fn check(&self, id: VertexId) -> Result<(), GraphError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(GraphError::InvalidVertex(id))
        }
    }

    /// 添加无向边（重复添加不会产生重复邻居）
    pub fn add_edge(&mut self, v: VertexId, w: VertexId) -> Result<(), GraphError> {
        self.check(v)?;
        self.check(w)?;

        if !self.adjacency[v].contains(&w) {
            self.adjacency[v].push(w);
        }
        if !self.adjacency[w].contains(&v) {
            self.adjacency[w].push(v);
        }
        Ok(())
    }

    /// 获取邻居列表（按插入顺序）
    pub fn neighbors(&self, v: VertexId) -> Result<&[VertexId], GraphError> {
        self.check(v)?;
        Ok(&self.adjacency[v])
    }

    /// v 的邻接表中是否包含 w
    pub fn is_adjacent(&self, v: VertexId, w: VertexId) -> bool {
        self.adjacency
            .get(v)
            .map(|list| list.contains(&w))
            .unwrap_or(false)
    }

    /// 双方邻接表中是否互相包含
    pub fn is_mutually_adjacent(&self, v: VertexId, w: VertexId) -> bool {
        self.is_adjacent(v, w) && self.is_adjacent(w, v)
    }

    /// 返回所有满足条件的顶点 ID
    pub fn filter<P>(&self, predicate: P) -> Vec<VertexId>
    where
        P: Fn(&T) -> bool,
    {
        self.vertices()
            .filter(|(_, vertex)| predicate(vertex))
            .map(|(id, _)| id)
            .collect()
    }

    /// 按条件连边：源条件必须恰好匹配一个顶点，目标条件至少匹配一个
    pub fn add_edges_by_filter<S, D>(&mut self, source: S, destination: D) -> Result<(), GraphError>
    where
        S: Fn(&T) -> bool,
        D: Fn(&T) -> bool,
    {
        let sources = self.filter(source);
        if sources.len() != 1 {
            return Err(GraphError::InvalidSource {
                matched: sources.len(),
            });
        }

        let destinations = self.filter(destination);
        if destinations.is_empty() {
            return Err(GraphError::InvalidDestination);
        }

        let src = sources[0];
        for dst in destinations {
            self.add_edge(src, dst)?;
        }
        Ok(())
    }

    /// 全图广度优先搜索，返回访问顺序中所有满足条件的顶点
    pub fn breadth_first_search<P>(&self, start: VertexId, predicate: P) -> Result<Vec<VertexId>, GraphError>
    where
        P: Fn(&T) -> bool,
    {
        self.check(start)?;

        let mut visited = vec![false; self.len()];
        let mut queue = VecDeque::from([start]);
        let mut matches = Vec::new();
        visited[start] = true;

        while let Some(v) = queue.pop_front() {
            if predicate(&self.vertices[v]) {
                matches.push(v);
            }
            for &w in &self.adjacency[v] {
                if !visited[w] {
                    visited[w] = true;
                    queue.push_back(w);
                }
            }
        }

        Ok(matches)
    }

    /// 连通广度优先搜索：只经由满足条件的顶点继续扩展
    ///
    /// `exclude_start` 为 true 时，起点无论是否满足条件都会扩展一次邻居，
    /// 这样不满足条件的起点也能找到相邻的匹配区域。
    pub fn contiguous_breadth_first_search<P>(
        &self,
        start: VertexId,
        predicate: P,
        exclude_start: bool,
    ) -> Result<Vec<VertexId>, GraphError>
    where
        P: Fn(&T) -> bool,
    {
        self.check(start)?;

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut matches = Vec::new();

        while let Some(v) = queue.pop_front() {
            if !visited.insert(v) {
                continue;
            }

            let expand = if predicate(&self.vertices[v]) {
                matches.push(v);
                true
            } else {
                exclude_start && v == start
            };

            if expand {
                queue.extend(self.adjacency[v].iter().filter(|w| !visited.contains(*w)));
            }
        }

        Ok(matches)
    }
}

/// 图快照条目：顶点及其邻居
#[derive(Debug, Serialize)]
pub struct GraphEntry<'a, T> {
    pub vertex: &'a T,
    pub neighbors: Vec<&'a T>,
}

impl<T: Serialize> Graph<T> {
    /// 生成按顶点顺序排列的快照
    pub fn snapshot(&self) -> Vec<GraphEntry<'_, T>> {
        self.vertices()
            .map(|(id, vertex)| GraphEntry {
                vertex,
                neighbors: self.adjacency[id]
                    .iter()
                    .map(|&w| &self.vertices[w])
                    .collect(),
            })
            .collect()
    }

    /// 序列化为 JSON
    pub fn dehydrate(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}
