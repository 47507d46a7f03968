//! Hierarchy views
//!
//! Both views come from one stack-based pre-order walk with a visited set,
//! so corrupted child lists (cycles, a child listed twice) still terminate
//! and each task appears at most once. Nothing here recurses: building,
//! dropping and rendering a tree all work for chains of any depth.

use std::collections::HashSet;

use super::TaskManager;
use crate::domain::{Task, TaskId};
use crate::storage::TaskPersistence;

/// A task with its nested children
#[derive(Debug)]
pub struct HierarchyNode {
    pub task: Task,
    pub children: Vec<HierarchyNode>,
}

impl Drop for HierarchyNode {
    fn drop(&mut self) {
        // Detach descendants first so each node drops with no children
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// One row of the flattened hierarchy
#[derive(Debug, Clone, Copy)]
pub struct HierarchyEntry<'a> {
    /// Distance from the root of the tree (0 for roots)
    pub depth: usize,
    pub task: &'a Task,
    parent: Option<usize>,
}

impl<P: TaskPersistence> TaskManager<P> {
    /// Walks every tree in pre-order, roots in id order
    pub fn hierarchy_walk(&self) -> Vec<HierarchyEntry<'_>> {
        let mut visited: HashSet<&TaskId> = HashSet::new();
        let mut entries = Vec::new();
        let mut stack: Vec<(&TaskId, usize, Option<usize>)> = self
            .tasks
            .values()
            .filter(|task| task.is_root())
            .map(|task| (&task.id, 0, None))
            .rev()
            .collect();

        while let Some((id, depth, parent)) = stack.pop() {
            let Some(task) = self.tasks.get(id) else {
                continue;
            };
            if !visited.insert(id) {
                continue;
            }

            let index = entries.len();
            entries.push(HierarchyEntry {
                depth,
                task,
                parent,
            });
            for child in task.child_ids.iter().rev() {
                if !visited.contains(child) {
                    stack.push((child, depth + 1, Some(index)));
                }
            }
        }

        entries
    }

    /// Returns every root task with its children nested recursively
    pub fn tasks_hierarchy(&self) -> Vec<HierarchyNode> {
        let entries = self.hierarchy_walk();
        let mut pending: Vec<Vec<HierarchyNode>> = (0..entries.len()).map(|_| Vec::new()).collect();
        let mut roots = Vec::new();

        // Children always follow their parent in pre-order
        for (index, entry) in entries.iter().enumerate().rev() {
            let mut children = std::mem::take(&mut pending[index]);
            children.reverse();
            let node = HierarchyNode {
                task: entry.task.clone(),
                children,
            };
            match entry.parent {
                Some(parent) => pending[parent].push(node),
                None => roots.push(node),
            }
        }

        roots.reverse();
        roots
    }

    /// Renders the nested hierarchy as compact JSON
    ///
    /// Each node is the task object with an extra `children` array. The
    /// text is produced from the flat walk, so depth costs no stack.
    pub fn hierarchy_json(&self) -> serde_json::Result<String> {
        let mut out = String::from("[");
        let mut open = 0usize;
        let mut first = true;

        for entry in self.hierarchy_walk() {
            while open > entry.depth {
                out.push_str("]}");
                open -= 1;
                first = false;
            }
            if !first {
                out.push(',');
            }

            let object = serde_json::to_string(entry.task)?;
            out.push_str(object.strip_suffix('}').unwrap_or(&object));
            out.push_str(",\"children\":[");
            open += 1;
            first = true;
        }

        for _ in 0..open {
            out.push_str("]}");
        }
        out.push(']');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{NewTask, Task, TaskId};
    use crate::manager::TaskManager;
    use crate::storage::{LocalStorage, MemoryKvStore};

    type MemoryManager = TaskManager<LocalStorage<MemoryKvStore>>;

    fn create(manager: &mut MemoryManager, title: &str, parent: Option<&TaskId>) -> TaskId {
        let mut fields = NewTask::new(title);
        fields.parent_id = parent.cloned();
        manager.create_task(fields).unwrap().id
    }

    fn titles(manager: &MemoryManager) -> Vec<(usize, String)> {
        manager
            .hierarchy_walk()
            .iter()
            .map(|entry| (entry.depth, entry.task.title.clone()))
            .collect()
    }

    #[test]
    fn empty_hierarchy() {
        let manager = TaskManager::new(LocalStorage::new(MemoryKvStore::new()));
        assert!(manager.tasks_hierarchy().is_empty());
        assert!(manager.hierarchy_walk().is_empty());
    }

    #[test]
    fn nests_children_in_order() {
        let mut manager = TaskManager::new(LocalStorage::new(MemoryKvStore::new()));
        let root = create(&mut manager, "Root", None);
        let first = create(&mut manager, "First", Some(&root));
        create(&mut manager, "Second", Some(&root));
        create(&mut manager, "Nested", Some(&first));

        let tree = manager.tasks_hierarchy();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].task.title, "Root");
        let children: Vec<_> = tree[0].children.iter().map(|n| n.task.title.as_str()).collect();
        assert_eq!(children, vec!["First", "Second"]);
        assert_eq!(tree[0].children[0].children[0].task.title, "Nested");
        assert!(tree[0].children[1].children.is_empty());

        assert_eq!(
            titles(&manager),
            vec![
                (0, "Root".to_string()),
                (1, "First".to_string()),
                (2, "Nested".to_string()),
                (1, "Second".to_string()),
            ]
        );
    }

    #[test]
    fn multiple_roots() {
        let mut manager = TaskManager::new(LocalStorage::new(MemoryKvStore::new()));
        create(&mut manager, "One", None);
        create(&mut manager, "Two", None);

        assert_eq!(manager.tasks_hierarchy().len(), 2);
    }

    #[test]
    fn shared_and_cyclic_children_appear_once() {
        let mut manager = TaskManager::new(LocalStorage::new(MemoryKvStore::new()));
        let a = create(&mut manager, "A", None);
        let b = create(&mut manager, "B", Some(&a));
        let c = create(&mut manager, "C", Some(&b));

        // Corrupt: C lists B again, and A lists C directly
        manager.tasks.get_mut(&c).unwrap().child_ids.push(b.clone());
        manager.tasks.get_mut(&a).unwrap().child_ids.push(c.clone());

        let walk = titles(&manager);
        assert_eq!(walk.len(), 3);

        let tree = manager.tasks_hierarchy();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children[0].children[0].task.title, "C");
        assert!(tree[0].children[0].children[0].children.is_empty());
    }

    #[test]
    fn json_nests_children_inline() {
        let mut manager = TaskManager::new(LocalStorage::new(MemoryKvStore::new()));
        let root = create(&mut manager, "Root", None);
        let child = create(&mut manager, "Child", Some(&root));
        create(&mut manager, "Grandchild", Some(&child));
        create(&mut manager, "Sibling", Some(&root));
        create(&mut manager, "Other root", None);

        let value: serde_json::Value =
            serde_json::from_str(&manager.hierarchy_json().unwrap()).unwrap();

        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["title"], "Root");
        assert_eq!(value[0]["level"], 0);
        assert_eq!(value[0]["children"][0]["title"], "Child");
        assert_eq!(value[0]["children"][0]["level"], 1);
        assert_eq!(value[0]["children"][0]["children"][0]["title"], "Grandchild");
        assert_eq!(value[0]["children"][0]["children"][0]["children"], serde_json::json!([]));
        assert_eq!(value[0]["children"][1]["title"], "Sibling");
        assert_eq!(value[1]["title"], "Other root");
    }

    #[test]
    fn json_of_empty_hierarchy() {
        let manager = TaskManager::new(LocalStorage::new(MemoryKvStore::new()));
        assert_eq!(manager.hierarchy_json().unwrap(), "[]");
    }

    /// A single chain `depth` levels deep, linked on both sides
    fn chain(depth: usize) -> Vec<Task> {
        let mut tasks: Vec<Task> = (0..depth)
            .map(|i| Task::new(format!("task_{}", i).parse().unwrap(), NewTask::new("Link")))
            .collect();
        for i in 1..depth {
            let (above, below) = tasks.split_at_mut(i);
            let parent = &mut above[i - 1];
            parent.add_child(below[0].id.clone());
            below[0].set_parent(Some(parent.id.clone()), i as u32);
        }
        tasks
    }

    #[test]
    fn deep_chain_builds_renders_and_drops() {
        const DEPTH: usize = 50_000;
        let mut store = LocalStorage::new(MemoryKvStore::new());
        store.save_tasks(chain(DEPTH)).unwrap();
        let manager = TaskManager::new(store);
        assert_eq!(manager.len(), DEPTH);

        let tree = manager.tasks_hierarchy();
        assert_eq!(tree.len(), 1);
        let mut depth = 1;
        let mut node = &tree[0];
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        drop(tree);

        let json = manager.hierarchy_json().unwrap();
        assert!(json.starts_with("[{"));
        assert!(json.ends_with(&format!("{}]", "]}".repeat(DEPTH))));
        assert_eq!(json.matches("\"children\":[").count(), DEPTH);
    }
}
