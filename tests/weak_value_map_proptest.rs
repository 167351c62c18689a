// WeakValueMap property test.
//
// Model: per key either a primitive or a reference to one of a small pool of
// objects. Only the pool holds strong references; each pool slot carries a
// generation so a replaced object is never confused with its successor.
//
// Invariants after every step:
// - get/has agree with the model: primitives always resolve, objects resolve
//   iff their pool slot still holds that generation.
// - delete returns true iff the model had a live value.
// - After a collection cycle, len() equals the number of live model entries
//   and registrations() equals the number of live object entries.
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use weak_value_map::{Value, WeakValueMap};

const KEYS: u8 = 5;
const OBJECTS: usize = 3;

#[derive(Clone, Debug)]
enum Op {
    SetPrim(u8, i32),
    SetObj(u8, usize),
    DropObj(usize),
    Delete(u8),
    Collect,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KEYS, any::<i32>()).prop_map(|(k, v)| Op::SetPrim(k, v)),
        (0..KEYS, 0..OBJECTS).prop_map(|(k, o)| Op::SetObj(k, o)),
        (0..OBJECTS).prop_map(Op::DropObj),
        (0..KEYS).prop_map(Op::Delete),
        Just(Op::Collect),
    ]
}

#[derive(Clone, Copy, Debug)]
enum Model {
    Prim(i32),
    Obj { slot: usize, generation: u32 },
}

struct Pool {
    objects: Vec<Option<Arc<String>>>,
    generations: Vec<u32>,
}

impl Pool {
    fn new() -> Self {
        Self {
            objects: vec![None; OBJECTS],
            generations: vec![0; OBJECTS],
        }
    }

    fn get_or_create(&mut self, slot: usize) -> (Arc<String>, u32) {
        let generation = &mut self.generations[slot];
        let obj = self.objects[slot]
            .get_or_insert_with(|| {
                *generation += 1;
                Arc::new(format!("obj{}#{}", slot, generation))
            })
            .clone();
        (obj, self.generations[slot])
    }

    fn live(&self, slot: usize, generation: u32) -> Option<&Arc<String>> {
        self.objects[slot]
            .as_ref()
            .filter(|_| self.generations[slot] == generation)
    }
}

fn is_live(pool: &Pool, m: &Model) -> bool {
    match *m {
        Model::Prim(_) => true,
        Model::Obj { slot, generation } => pool.live(slot, generation).is_some(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_matches_model(ops in proptest::collection::vec(arb_op(), 1..120)) {
        let map: WeakValueMap<u8, i32, String> = WeakValueMap::new();
        let mut model: HashMap<u8, Model> = HashMap::new();
        let mut pool = Pool::new();

        for op in ops {
            match op {
                Op::SetPrim(k, v) => {
                    map.set(k, Value::<i32, String>::Primitive(v));
                    model.insert(k, Model::Prim(v));
                }
                Op::SetObj(k, slot) => {
                    let (obj, generation) = pool.get_or_create(slot);
                    map.set(k, obj);
                    model.insert(k, Model::Obj { slot, generation });
                }
                Op::DropObj(slot) => {
                    pool.objects[slot] = None;
                }
                Op::Delete(k) => {
                    let expected = model.remove(&k).is_some_and(|m| is_live(&pool, &m));
                    prop_assert_eq!(map.delete(&k), expected);
                }
                Op::Collect => {
                    map.collect();
                    model.retain(|_, m| is_live(&pool, m));
                    prop_assert_eq!(map.len(), model.len());
                    let objects = model.values().filter(|m| matches!(m, Model::Obj { .. })).count();
                    prop_assert_eq!(map.registrations(), objects);
                }
            }

            for k in 0..KEYS {
                let got = map.get(&k);
                match model.get(&k) {
                    Some(Model::Prim(v)) => prop_assert_eq!(got, Some(Value::Primitive(*v))),
                    Some(Model::Obj { slot, generation }) => match pool.live(*slot, *generation) {
                        Some(obj) => {
                            let got = got.and_then(Value::into_object);
                            prop_assert!(got.is_some_and(|g| Arc::ptr_eq(&g, obj)));
                        }
                        None => prop_assert!(got.is_none()),
                    },
                    None => prop_assert!(got.is_none()),
                }
                let live = model.get(&k).is_some_and(|m| is_live(&pool, m));
                prop_assert_eq!(map.has(&k), live);
            }
            let live = model.values().filter(|m| is_live(&pool, m)).count();
            prop_assert!(map.len() >= live);
            prop_assert_eq!(map.iter().count(), live);
        }
    }
}
