use std::error::Error;

use crate::{ListableStorageTraits, ReadableStorageTraits, WritableStorageTraits};

#[allow(clippy::missing_errors_doc)]
/// Write the following data to an empty store
/// ```text
/// - header [0, 1, 2, 3]
/// - vlmeta [0]
/// - chunks/
///   - 0 [0, 1]
///   - 1
///   - 10 [2]
/// ```
pub fn store_write<T: WritableStorageTraits>(store: &T) -> Result<(), Box<dyn Error>> {
    store.set(&"header".try_into()?, vec![255, 255, 255].into())?;
    store.set(&"header".try_into()?, vec![0, 1, 2, 3].into())?; // overwrites
    store.set(&"vlmeta".try_into()?, vec![0].into())?;
    store.set(&"chunks/0".try_into()?, vec![0, 1].into())?;
    store.set(&"chunks/1".try_into()?, vec![].into())?;
    store.set(&"chunks/10".try_into()?, vec![2].into())?;

    store.set(&"erase".try_into()?, vec![].into())?;
    store.erase(&"erase".try_into()?)?;
    store.erase(&"erase".try_into()?)?; // succeeds

    store.set(&"chunks/2".try_into()?, vec![3].into())?;
    store.erase(&"chunks/2".try_into()?)?;

    store.flush()?;

    Ok(())
}

#[allow(clippy::missing_errors_doc)]
/// Read from the store and check the data matches the expected values after [`store_write`].
pub fn store_read<T: ReadableStorageTraits>(store: &T) -> Result<(), Box<dyn Error>> {
    assert!(store.get(&"notfound".try_into()?)?.is_none());
    assert!(store.get(&"erase".try_into()?)?.is_none());
    assert!(store.get(&"chunks/2".try_into()?)?.is_none());
    assert_eq!(
        store.get(&"header".try_into()?)?,
        Some(vec![0, 1, 2, 3].into())
    );
    assert_eq!(store.get(&"vlmeta".try_into()?)?, Some(vec![0].into()));
    assert_eq!(store.get(&"chunks/1".try_into()?)?, Some(vec![].into()));
    assert_eq!(store.get(&"chunks/10".try_into()?)?, Some(vec![2].into()));
    Ok(())
}

#[allow(clippy::missing_errors_doc)]
/// List the store and check the data matches the expected values after [`store_write`].
pub fn store_list<T: ListableStorageTraits>(store: &T) -> Result<(), Box<dyn Error>> {
    let mut keys = store.list_prefix(&"".try_into()?)?;
    keys.sort();
    assert_eq!(
        keys,
        &[
            "chunks/0".try_into()?,
            "chunks/1".try_into()?,
            "chunks/10".try_into()?,
            "header".try_into()?,
            "vlmeta".try_into()?,
        ]
    );

    let mut keys = store.list_prefix(&"chunks/".try_into()?)?;
    keys.sort();
    assert_eq!(
        keys,
        &[
            "chunks/0".try_into()?,
            "chunks/1".try_into()?,
            "chunks/10".try_into()?,
        ]
    );
    assert_eq!(store.list_prefix(&"notfound/".try_into()?)?, &[]);
    Ok(())
}
