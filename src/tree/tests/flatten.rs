use crate::tree::{Path, PathSegment, Tree};
use std::collections::BTreeMap;

fn sample_tree() -> Tree<i32> {
    // {a: {b: 1, c: [2, 3]}, d: 4}
    let mut inner = BTreeMap::new();
    inner.insert("b".to_string(), Tree::Leaf(1));
    inner.insert(
        "c".to_string(),
        Tree::List(vec![Tree::Leaf(2), Tree::Leaf(3)]),
    );
    let mut root = BTreeMap::new();
    root.insert("a".to_string(), Tree::Dict(inner));
    root.insert("d".to_string(), Tree::Leaf(4));
    Tree::Dict(root)
}

/// 测试leaf_paths：字典键与序列下标统一作为路径段
#[test]
fn test_leaf_paths() {
    let tree = sample_tree();
    let pairs = tree.leaf_paths();

    let rendered: Vec<(String, i32)> = pairs
        .iter()
        .map(|(p, v)| (p.to_string(), **v))
        .collect();
    assert_eq!(
        rendered,
        vec![
            ("a/b".to_string(), 1),
            ("a/c/0".to_string(), 2),
            ("a/c/1".to_string(), 3),
            ("d".to_string(), 4),
        ]
    );
}

/// 测试展平-重建往返：flatten(unflatten(pairs)) == pairs
#[test]
fn test_flatten_unflatten_roundtrip() {
    let tree = sample_tree();
    let pairs: Vec<(Path, i32)> = tree
        .leaf_paths()
        .into_iter()
        .map(|(p, v)| (p, *v))
        .collect();

    let rebuilt = Tree::unflatten(&pairs).unwrap();
    let pairs2: Vec<(Path, i32)> = rebuilt
        .leaf_paths()
        .into_iter()
        .map(|(p, v)| (p, *v))
        .collect();
    assert_eq!(pairs, pairs2, "往返后（路径，叶子）对应保持一致且有序");
}

/// 测试以下标段开头的路径重建为List
#[test]
fn test_unflatten_root_list() {
    let pairs = vec![
        (Path::new(vec![PathSegment::Index(0)]), 10),
        (Path::new(vec![PathSegment::Index(1)]), 20),
    ];
    let tree = Tree::unflatten(&pairs).unwrap();
    assert_eq!(tree, Tree::List(vec![Tree::Leaf(10), Tree::Leaf(20)]));
}

/// 测试单个根路径叶子的重建
#[test]
fn test_unflatten_single_leaf() {
    let pairs = vec![(Path::root(), 7)];
    assert_eq!(Tree::unflatten(&pairs).unwrap(), Tree::Leaf(7));
}

/// 测试flatten_names：序列下标不进入名称
#[test]
fn test_flatten_names_skips_indices() {
    let tree = sample_tree();
    let names: Vec<(String, i32)> = tree
        .flatten_names()
        .into_iter()
        .map(|(n, v)| (n, *v))
        .collect();
    assert_eq!(
        names,
        vec![
            ("a/b".to_string(), 1),
            ("a/c".to_string(), 2),
            ("a/c".to_string(), 3),
            ("d".to_string(), 4),
        ]
    );
}

/// 测试按路径读与写
#[test]
fn test_get_and_insert() {
    let mut tree: Tree<i32> = Tree::dict();
    let path = Path::root().child("layer").child("w");
    tree.insert(&path, 5).unwrap();

    assert_eq!(tree.get_leaf(&path), Some(&5));
    assert_eq!(tree.get_leaf(&Path::root().child("layer").child("b")), None);

    // 叶子可被覆盖
    tree.insert(&path, 6).unwrap();
    assert_eq!(tree.get_leaf(&path), Some(&6));

    // 叶子不能覆盖非空子树
    let err = tree.insert(&Path::root().child("layer"), 0).unwrap_err();
    assert!(matches!(
        err,
        crate::errors::ModuleError::MergeConflict { .. }
    ));
}

/// 测试路径的前缀与截断
#[test]
fn test_path_prefix() {
    let path = Path::root().child("a").child("b").child(0);
    assert_eq!(path.depth(), 3);
    assert!(path.starts_with(&Path::root()));
    assert!(path.starts_with(&Path::root().child("a")));
    assert!(!path.starts_with(&Path::root().child("b")));
    assert_eq!(path.truncated(2), Path::root().child("a").child("b"));
    assert_eq!(path.to_string(), "a/b/0");
}
