use kubert::index::IndexClusterResource;
use parking_lot::RwLock;
use std::sync::Arc;

/// Fans a single cluster-scoped watch out to several indexes.
pub struct IndexList<A, T = A> {
    index: Arc<RwLock<A>>,
    tail: Option<T>,
}

impl<A, T, R> IndexClusterResource<R> for IndexList<A, T>
where
    A: IndexClusterResource<R>,
    T: IndexClusterResource<R>,
    R: Clone,
{
    fn apply(&mut self, resource: R) {
        if let Some(tail) = &mut self.tail {
            tail.apply(resource.clone());
        }
        self.index.write().apply(resource);
    }

    fn delete(&mut self, name: String) {
        if let Some(tail) = &mut self.tail {
            tail.delete(name.clone());
        }
        self.index.write().delete(name);
    }
}

impl<A> IndexList<A> {
    pub fn new(index: Arc<RwLock<A>>) -> Self {
        IndexList { index, tail: None }
    }
}

impl<A, T> IndexList<A, T> {
    pub fn push<B>(self, index: Arc<RwLock<B>>) -> IndexList<B, Self> {
        IndexList {
            index,
            tail: Some(self),
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterset_controller_k8s_api::{ManagedClusterSet, ResourceExt};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Names(Vec<String>);

    impl IndexClusterResource<ManagedClusterSet> for Names {
        fn apply(&mut self, set: ManagedClusterSet) {
            self.0.push(set.name_unchecked());
        }

        fn delete(&mut self, name: String) {
            self.0.retain(|n| *n != name);
        }
    }

    #[test]
    fn fans_out_to_every_index() {
        let a = Arc::new(RwLock::new(Names::default()));
        let b = Arc::new(RwLock::new(Names::default()));
        let c = Arc::new(RwLock::new(Names::default()));
        let mut list = IndexList::new(a.clone()).push(b.clone()).push(c.clone());

        list.apply(ManagedClusterSet::new("prod", Default::default()));
        list.apply(ManagedClusterSet::new("staging", Default::default()));
        list.delete("prod".to_string());

        for index in [a, b, c] {
            assert_eq!(index.read().0, vec!["staging".to_string()]);
        }
    }
}
